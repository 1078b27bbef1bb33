// SPDX-License-Identifier: MIT OR Apache-2.0

//! `contracts.side_effects.deny_write_tools` (§4.5 "Side effects").

use globset::GlobSet;

use trt_core::error::ErrorCode;
use trt_core::event::Kind;
use trt_core::spec::SideEffectsContract;
use trt_core::trace::Trace;
use trt_core::violation::Violation;

use crate::violation;

pub(crate) fn evaluate(
    cfg: &SideEffectsContract,
    write_tools: Option<&GlobSet>,
    trace: &Trace,
    violations: &mut Vec<Violation>,
) {
    if !cfg.deny_write_tools {
        return;
    }
    for event in trace.events_of_kind(Kind::ToolCall) {
        let Some(name) = event.tool_name() else { continue };
        let is_write = write_tools.is_some_and(|set| set.is_match(name)) || cfg.write_tools.contains(name);
        if is_write {
            violations.push(violation(
                ErrorCode::ContractWriteToolDenied,
                event.seq,
                format!("tool `{name}` performs a denied write side effect"),
            ));
        }
    }
}
