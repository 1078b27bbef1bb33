// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! The ordered list of tool names extracted from `tool_called` events (§3.3).

use std::collections::BTreeSet;

use crate::event::EventType;
use crate::trace::Trace;

/// The ordered list of tool names extracted from `tool_called` events, after
/// removing any name in `ignore`. Used for refinement only; `tool_returned`
/// events are excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Skeleton {
    /// `(seq, tool_name)` pairs in emission order, so callers can recover the
    /// originating event index for violation anchoring.
    pub calls: Vec<(i64, String)>,
}

impl Skeleton {
    /// Extract the skeleton from a trace, filtering out names in `ignore`.
    pub fn extract(trace: &Trace, ignore: &BTreeSet<String>) -> Self {
        let calls = trace
            .events
            .iter()
            .filter(|e| e.event_type == EventType::ToolCalled)
            .filter_map(|e| e.tool_name().map(|name| (e.seq, name.to_string())))
            .filter(|(_, name)| !ignore.contains(name))
            .collect();
        Self { calls }
    }

    /// Just the tool names, in order.
    pub fn names(&self) -> Vec<&str> {
        self.calls.iter().map(|(_, n)| n.as_str()).collect()
    }

    /// Number of calls in the skeleton.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether the skeleton has no calls.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Kind, NormalizedEvent};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn tool_call(seq: i64, name: &str) -> NormalizedEvent {
        NormalizedEvent {
            event_type: EventType::ToolCalled,
            seq,
            rel_ms: 0,
            payload: json!({"tool_name": name, "input": {"args": [], "kwargs": {}}}),
            meta: BTreeMap::new(),
            event_id: format!("id-{seq}"),
            kind: Kind::ToolCall,
        }
    }

    #[test]
    fn extracts_names_in_order() {
        let trace = Trace {
            run_id: "r".into(),
            events: vec![tool_call(1, "fetch"), tool_call(2, "store")],
        };
        let sk = Skeleton::extract(&trace, &BTreeSet::new());
        assert_eq!(sk.names(), vec!["fetch", "store"]);
    }

    #[test]
    fn ignores_configured_tools() {
        let trace = Trace {
            run_id: "r".into(),
            events: vec![tool_call(1, "fetch"), tool_call(2, "log_event")],
        };
        let ignore = BTreeSet::from(["log_event".to_string()]);
        let sk = Skeleton::extract(&trace, &ignore);
        assert_eq!(sk.names(), vec!["fetch"]);
    }
}
