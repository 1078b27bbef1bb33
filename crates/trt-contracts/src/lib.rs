// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Contract monitor Φ (§4.5): evaluates every enabled obligation against a
//! candidate trace and emits a list of violations, each anchored to the
//! smallest event index at which it is observable.
//!
//! Family evaluation order is fixed and never short-circuits: tool policy →
//! budgets → sequence → side_effects → network → data_leak → args. Within a
//! family, checks walk events in ascending `seq` (the order [`Trace`]
//! already guarantees).

mod args;
mod budgets;
mod network;
mod sequence;
mod side_effects;
mod tools;

use globset::GlobSet;
use regex::Regex;

use trt_core::error::ErrorCode;
use trt_core::spec::{BudgetThresholds, ContractsConfig};
use trt_core::trace::Trace;
use trt_core::violation::Violation;
use trt_core::TrtError;
use trt_glob::IncludeExcludeGlobs;

/// A compiled, reusable evaluator for one resolved spec's `contracts.*` and
/// `budget_thresholds.*` obligations.
///
/// Glob patterns and `contracts.args.*.fields.*.regex` patterns are compiled
/// once here rather than per-event; an invalid pattern fails at
/// construction as a TOOLING error (§4.5: "Invalid spec is rejected before
/// evaluation starts"), not mid-evaluation.
pub struct ContractMonitor {
    contracts: ContractsConfig,
    budgets: BudgetThresholds,
    tool_rules: IncludeExcludeGlobs,
    write_tool_set: Option<GlobSet>,
    arg_regexes: Vec<((String, String), Regex)>,
}

impl ContractMonitor {
    /// Compile a monitor from a resolved spec's contract sections.
    pub fn new(contracts: ContractsConfig, budgets: BudgetThresholds) -> Result<Self, TrtError> {
        let tool_rules = IncludeExcludeGlobs::new(&contracts.tools.allow, &contracts.tools.deny)
            .map_err(|e| TrtError::internal(format!("compile tool policy globs: {e:#}")))?;
        let write_tool_set = trt_glob::build_globset(&contracts.side_effects.write_tools)
            .map_err(|e| TrtError::internal(format!("compile write-tool globs: {e:#}")))?;

        let mut arg_regexes = Vec::new();
        for (tool, schema) in &contracts.args {
            for (field, constraint) in &schema.fields {
                if let Some(pattern) = &constraint.regex {
                    let re = Regex::new(pattern)?;
                    arg_regexes.push(((tool.clone(), field.clone()), re));
                }
            }
        }

        Ok(Self {
            contracts,
            budgets,
            tool_rules,
            write_tool_set,
            arg_regexes,
        })
    }

    fn arg_regex(&self, tool: &str, field: &str) -> Option<&Regex> {
        self.arg_regexes
            .iter()
            .find(|((t, f), _)| t == tool && f == field)
            .map(|(_, re)| re)
    }

    /// Evaluate every enabled family against `trace`, in the fixed order.
    pub fn evaluate(&self, trace: &Trace) -> Vec<Violation> {
        let mut violations = Vec::new();
        tools::evaluate(&self.contracts.tools, &self.tool_rules, trace, &mut violations);
        budgets::evaluate(&self.contracts.tools, &self.budgets, trace, &mut violations);
        sequence::evaluate(&self.contracts.sequence, trace, &mut violations);
        side_effects::evaluate(
            &self.contracts.side_effects,
            self.write_tool_set.as_ref(),
            trace,
            &mut violations,
        );
        network::evaluate(&self.contracts.network, trace, &mut violations);
        network::data_leak(&self.contracts.data_leak, trace, &mut violations);
        args::evaluate(&self.contracts.args, self, trace, &mut violations);
        violations
    }
}

/// Render a [`trt_core::event::Kind`] as the SCREAMING_SNAKE_CASE label used
/// by `contracts.data_leak.outbound_kinds` (§3.4, §6.1).
pub(crate) fn kind_label(kind: trt_core::event::Kind) -> &'static str {
    use trt_core::event::Kind;
    match kind {
        Kind::ToolCall => "TOOL_CALL",
        Kind::ToolResult => "TOOL_RESULT",
        Kind::LlmRequest => "LLM_REQUEST",
        Kind::LlmResponse => "LLM_RESPONSE",
        Kind::Message => "MESSAGE",
        Kind::Observation => "OBSERVATION",
        Kind::Error => "ERROR",
    }
}

pub(crate) fn violation(code: ErrorCode, event_index: i64, message: impl Into<String>) -> Violation {
    Violation::new(code, event_index, message)
}
