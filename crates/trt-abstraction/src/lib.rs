// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Abstraction α (§4.4): a pure, deterministic map from a normalized trace
//! to a token stream, a call skeleton, and derived predicates. No I/O, no
//! randomness, no time reads; all map/set iteration is over sorted keys.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde_json::Value;

use trt_core::event::{EventType, Kind, NormalizedEvent};
use trt_core::pii::contains_pii;
use trt_core::skeleton::Skeleton;
use trt_core::trace::Trace;

/// One token in the per-event token stream (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Call(String),
    Result(String),
    LlmRequest(String),
    LlmResponse(String),
    Message,
    Observation,
    Error,
}

/// Configuration for predicate extraction, resolved from the spec by the
/// orchestrator before abstraction runs.
#[derive(Debug, Clone, Default)]
pub struct AbstractionConfig {
    /// Tool names stripped from the skeleton before refinement (both sides).
    pub ignore_call_tools: BTreeSet<String>,
    /// Pattern identifying "refund" tool calls for the `refund_count` predicate.
    pub refund_pattern: Option<Regex>,
    /// Dotted paths into an event's `payload` to scan for numeric `price` values.
    pub price_paths: Vec<String>,
}

/// The minimum predicate set (§4.4, v1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicates {
    pub pii: bool,
    pub price: Vec<f64>,
    pub refund_count: u64,
    pub tool_calls_total: u64,
    pub tool_calls_by_name: BTreeMap<String, u64>,
    pub domains: BTreeSet<String>,
}

/// The output of abstraction: tokens, skeleton, and predicates for one trace.
#[derive(Debug, Clone)]
pub struct Abstraction {
    pub tokens: Vec<Token>,
    pub skeleton: Skeleton,
    pub predicates: Predicates,
}

fn token_for(event: &NormalizedEvent) -> Token {
    match event.kind {
        Kind::ToolCall => Token::Call(event.tool_name().unwrap_or_default().to_string()),
        Kind::ToolResult => Token::Result(event.tool_name().unwrap_or_default().to_string()),
        Kind::LlmRequest => Token::LlmRequest(model_of(event)),
        Kind::LlmResponse => Token::LlmResponse(model_of(event)),
        Kind::Message => Token::Message,
        Kind::Observation => Token::Observation,
        Kind::Error => Token::Error,
    }
}

fn model_of(event: &NormalizedEvent) -> String {
    event
        .payload
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn collect_domains(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if (k == "domain" || k == "host") && let Some(s) = v.as_str() {
                    out.insert(s.to_string());
                }
                collect_domains(v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_domains(item, out);
            }
        }
        _ => {}
    }
}

fn scan_strings_for_pii(value: &Value) -> bool {
    match value {
        Value::String(s) => contains_pii(s),
        Value::Array(items) => items.iter().any(scan_strings_for_pii),
        Value::Object(map) => map.values().any(scan_strings_for_pii),
        _ => false,
    }
}

/// Compute tokens, skeleton, and predicates for `trace`. Operates on the
/// already redaction-and-strip-normalized trace, so the result is invariant
/// under volatile fields.
pub fn abstract_trace(trace: &Trace, config: &AbstractionConfig) -> Abstraction {
    let tokens = trace.events.iter().map(token_for).collect();
    let skeleton = Skeleton::extract(trace, &config.ignore_call_tools);

    let mut predicates = Predicates::default();
    for event in &trace.events {
        if event.event_type == EventType::ToolCalled {
            predicates.tool_calls_total += 1;
            if let Some(name) = event.tool_name() {
                *predicates.tool_calls_by_name.entry(name.to_string()).or_insert(0) += 1;
                if config
                    .refund_pattern
                    .as_ref()
                    .is_some_and(|re| re.is_match(name))
                {
                    predicates.refund_count += 1;
                }
            }
        }

        if matches!(event.kind, Kind::ToolCall | Kind::LlmRequest) {
            if scan_strings_for_pii(&event.payload) {
                predicates.pii = true;
            }
            collect_domains(&event.payload, &mut predicates.domains);
        }

        for path in &config.price_paths {
            if let Some(n) = get_path(&event.payload, path).and_then(Value::as_f64) {
                predicates.price.push(n);
            }
        }
    }

    Abstraction {
        tokens,
        skeleton,
        predicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap as Map;
    use trt_core::event::RawEvent;

    fn raw(event_type: EventType, seq: i64, payload: Value) -> RawEvent {
        RawEvent {
            schema_version: None,
            event_type,
            seq,
            run_id: "r".into(),
            rel_ms: 0,
            payload,
            meta: Map::new(),
            event_id: None,
        }
    }

    fn trace_of(raws: Vec<RawEvent>) -> Trace {
        Trace::from_raw_events("r", &raws, &[]).unwrap()
    }

    #[test]
    fn token_stream_matches_event_kinds() {
        let trace = trace_of(vec![
            raw(EventType::RunStarted, 1, json!({"spec_name": "s"})),
            raw(
                EventType::ToolCalled,
                2,
                json!({"tool_name": "fetch", "input": {"args": [], "kwargs": {}}}),
            ),
            raw(EventType::RunFinished, 3, json!({"status": "ok"})),
        ]);
        let abstraction = abstract_trace(&trace, &AbstractionConfig::default());
        assert_eq!(
            abstraction.tokens,
            vec![Token::Observation, Token::Call("fetch".to_string()), Token::Observation]
        );
    }

    #[test]
    fn counts_tool_calls_by_name() {
        let trace = trace_of(vec![
            raw(
                EventType::ToolCalled,
                1,
                json!({"tool_name": "fetch", "input": {"args": [], "kwargs": {}}}),
            ),
            raw(
                EventType::ToolCalled,
                2,
                json!({"tool_name": "fetch", "input": {"args": [], "kwargs": {}}}),
            ),
        ]);
        let abstraction = abstract_trace(&trace, &AbstractionConfig::default());
        assert_eq!(abstraction.predicates.tool_calls_total, 2);
        assert_eq!(abstraction.predicates.tool_calls_by_name["fetch"], 2);
    }

    #[test]
    fn detects_pii_in_outbound_tool_call() {
        let trace = trace_of(vec![raw(
            EventType::ToolCalled,
            1,
            json!({"tool_name": "notify", "input": {"args": ["jane@example.com"], "kwargs": {}}}),
        )]);
        let abstraction = abstract_trace(&trace, &AbstractionConfig::default());
        assert!(abstraction.predicates.pii);
    }

    #[test]
    fn extracts_domains_from_payload() {
        let trace = trace_of(vec![raw(
            EventType::ToolCalled,
            1,
            json!({"tool_name": "http_get", "input": {"args": [], "kwargs": {"domain": "api.example.com"}}}),
        )]);
        let abstraction = abstract_trace(&trace, &AbstractionConfig::default());
        assert!(abstraction.predicates.domains.contains("api.example.com"));
    }

    #[test]
    fn counts_refund_matching_tool_calls() {
        let config = AbstractionConfig {
            refund_pattern: Some(Regex::new("^refund_").unwrap()),
            ..Default::default()
        };
        let trace = trace_of(vec![
            raw(
                EventType::ToolCalled,
                1,
                json!({"tool_name": "refund_order", "input": {"args": [], "kwargs": {}}}),
            ),
            raw(
                EventType::ToolCalled,
                2,
                json!({"tool_name": "fetch_order", "input": {"args": [], "kwargs": {}}}),
            ),
        ]);
        let abstraction = abstract_trace(&trace, &config);
        assert_eq!(abstraction.predicates.refund_count, 1);
    }
}
