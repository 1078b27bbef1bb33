// SPDX-License-Identifier: MIT OR Apache-2.0

//! `contracts.tools.allow` / `contracts.tools.deny` (§4.5 "Tool policy").

use trt_core::error::ErrorCode;
use trt_core::event::Kind;
use trt_core::spec::ToolsContract;
use trt_core::trace::Trace;
use trt_core::violation::Violation;
use trt_glob::{IncludeExcludeGlobs, MatchDecision};

use crate::violation;

pub(crate) fn evaluate(
    _cfg: &ToolsContract,
    rules: &IncludeExcludeGlobs,
    trace: &Trace,
    violations: &mut Vec<Violation>,
) {
    for event in trace.events_of_kind(Kind::ToolCall) {
        let Some(name) = event.tool_name() else { continue };
        match rules.decide_str(name) {
            MatchDecision::Allowed => {}
            MatchDecision::DeniedByExclude => violations.push(violation(
                ErrorCode::ContractToolDenied,
                event.seq,
                format!("tool `{name}` is denied"),
            )),
            MatchDecision::DeniedByMissingInclude => violations.push(violation(
                ErrorCode::ContractToolNotAllowed,
                event.seq,
                format!("tool `{name}` is not in the allowlist"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use trt_core::event::{EventType, RawEvent};

    fn raw(seq: i64, tool: &str) -> RawEvent {
        RawEvent {
            schema_version: None,
            event_type: EventType::ToolCalled,
            seq,
            run_id: "r".into(),
            rel_ms: seq * 10,
            payload: json!({"tool_name": tool, "input": {"args": [], "kwargs": {}}}),
            meta: BTreeMap::new(),
            event_id: None,
        }
    }

    #[test]
    fn deny_wins_over_allow() {
        let rules = IncludeExcludeGlobs::new(vec!["fetch"], vec!["fetch"]).unwrap();
        let trace = Trace::from_raw_events("r", &[raw(1, "fetch")], &[]).unwrap();
        let mut out = Vec::new();
        evaluate(&ToolsContract::default(), &rules, &trace, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, ErrorCode::ContractToolDenied);
    }

    #[test]
    fn non_allowlisted_tool_is_rejected() {
        let rules = IncludeExcludeGlobs::new(vec!["fetch"], Vec::<&str>::new()).unwrap();
        let trace = Trace::from_raw_events("r", &[raw(1, "delete_all")], &[]).unwrap();
        let mut out = Vec::new();
        evaluate(&ToolsContract::default(), &rules, &trace, &mut out);
        assert_eq!(out[0].code, ErrorCode::ContractToolNotAllowed);
    }
}
