// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared fixtures for the root-level integration tests: small helpers for
//! building well-formed raw event traces without repeating the JSON shape
//! `RawEvent::validate_shape` requires in every test file.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use trt_core::event::{EventType, RawEvent};

pub fn run_started(seq: i64, spec_name: &str) -> RawEvent {
    raw(EventType::RunStarted, seq, json!({"spec_name": spec_name}))
}

pub fn run_finished(seq: i64, status: &str) -> RawEvent {
    raw(EventType::RunFinished, seq, json!({"status": status}))
}

pub fn tool_called(seq: i64, tool_name: &str) -> RawEvent {
    tool_called_with(seq, tool_name, json!([]), json!({}))
}

pub fn tool_called_with(seq: i64, tool_name: &str, args: Value, kwargs: Value) -> RawEvent {
    raw(
        EventType::ToolCalled,
        seq,
        json!({"tool_name": tool_name, "input": {"args": args, "kwargs": kwargs}}),
    )
}

pub fn tool_returned(seq: i64, tool_name: &str) -> RawEvent {
    raw(EventType::ToolReturned, seq, json!({"tool_name": tool_name, "output": "ok"}))
}

pub fn tool_returned_error(seq: i64, tool_name: &str, error: &str) -> RawEvent {
    raw(
        EventType::ToolReturned,
        seq,
        json!({"tool_name": tool_name, "output": Value::Null, "error": error}),
    )
}

pub fn llm_called(seq: i64, provider: &str, model: &str) -> RawEvent {
    raw(
        EventType::LlmCalled,
        seq,
        json!({"provider": provider, "model": model, "messages": []}),
    )
}

pub fn llm_returned(seq: i64, provider: &str, model: &str, output: &str) -> RawEvent {
    raw(
        EventType::LlmReturned,
        seq,
        json!({"provider": provider, "model": model, "output": output}),
    )
}

fn raw(event_type: EventType, seq: i64, payload: Value) -> RawEvent {
    RawEvent {
        schema_version: None,
        event_type,
        seq,
        run_id: "r".into(),
        rel_ms: seq * 10,
        payload,
        meta: BTreeMap::new(),
        event_id: None,
    }
}
