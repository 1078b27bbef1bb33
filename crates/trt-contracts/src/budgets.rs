// SPDX-License-Identifier: MIT OR Apache-2.0

//! `contracts.tools.max_calls_*` and `budget_thresholds.*` (§4.5 "Budgets").

use std::collections::BTreeMap;

use trt_core::error::ErrorCode;
use trt_core::event::Kind;
use trt_core::spec::{BudgetThresholds, ToolsContract};
use trt_core::trace::Trace;
use trt_core::violation::Violation;

use crate::violation;

fn tokens_of(event: &trt_core::event::NormalizedEvent) -> Option<u64> {
    let usage = event.payload.get("usage")?;
    if let Some(total) = usage.get("total_tokens").and_then(|v| v.as_u64()) {
        return Some(total);
    }
    let prompt = usage.get("prompt_tokens").and_then(|v| v.as_u64());
    let completion = usage.get("completion_tokens").and_then(|v| v.as_u64());
    match (prompt, completion) {
        (None, None) => None,
        (p, c) => Some(p.unwrap_or(0) + c.unwrap_or(0)),
    }
}

pub(crate) fn evaluate(
    tools: &ToolsContract,
    budgets: &BudgetThresholds,
    trace: &Trace,
    violations: &mut Vec<Violation>,
) {
    let mut total: u64 = 0;
    let mut per_tool: BTreeMap<String, u64> = BTreeMap::new();
    let mut total_budget_tripped = false;
    let mut tokens_seen: u64 = 0;
    let mut tokens_budget_tripped = false;

    for event in trace.events_of_kind(Kind::ToolCall) {
        let name = event.tool_name().unwrap_or_default().to_string();
        total += 1;
        let tool_count = per_tool.entry(name.clone()).or_insert(0);
        *tool_count += 1;

        if let Some(max_total) = tools.max_calls_total
            && total > max_total
        {
            violations.push(violation(
                ErrorCode::ContractMaxCallsTotalExceeded,
                event.seq,
                format!("total tool calls exceeded max_calls_total={max_total}"),
            ));
        }
        if let Some(&max_for_tool) = tools.max_calls_per_tool.get(&name)
            && *tool_count > max_for_tool
        {
            violations.push(violation(
                ErrorCode::ContractMaxCallsTotalExceeded,
                event.seq,
                format!("tool `{name}` exceeded max_calls_per_tool={max_for_tool}"),
            ));
        }
        if let Some(max_calls) = budgets.max_tool_calls
            && total > max_calls
            && !total_budget_tripped
        {
            total_budget_tripped = true;
            violations.push(violation(
                ErrorCode::BudgetToolCallsExceeded,
                event.seq,
                format!("tool calls exceeded budget_thresholds.max_tool_calls={max_calls}"),
            ));
        }
    }

    if let Some(max_tokens) = budgets.max_tokens {
        for event in trace.events_of_kind(Kind::LlmResponse) {
            let Some(tokens) = tokens_of(event) else { continue };
            tokens_seen += tokens;
            if tokens_seen > max_tokens && !tokens_budget_tripped {
                tokens_budget_tripped = true;
                violations.push(violation(
                    ErrorCode::BudgetTokensExceeded,
                    event.seq,
                    format!("token usage exceeded budget_thresholds.max_tokens={max_tokens}"),
                ));
            }
        }
    }

    if let Some(max_latency) = budgets.max_latency_ms
        && let Some(last) = trace.last_event()
        && last.rel_ms > max_latency
    {
        violations.push(violation(
            ErrorCode::BudgetLatencyExceeded,
            last.seq,
            format!(
                "run latency {}ms exceeded budget_thresholds.max_latency_ms={max_latency}",
                last.rel_ms
            ),
        ));
    }
}
