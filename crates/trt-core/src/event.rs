// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! The wire event type, its normalized form, and the normalized `kind` token.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TrtError;

/// Fixed schema version accepted by the canonicalizer.
pub const SCHEMA_VERSION: &str = "v1";

/// The seven event types recognized on the wire (see the event JSONL format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    AgentStep,
    LlmCalled,
    LlmReturned,
    ToolCalled,
    ToolReturned,
    RunFinished,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RunStarted => "run_started",
            Self::AgentStep => "agent_step",
            Self::LlmCalled => "llm_called",
            Self::LlmReturned => "llm_returned",
            Self::ToolCalled => "tool_called",
            Self::ToolReturned => "tool_returned",
            Self::RunFinished => "run_finished",
        };
        f.write_str(s)
    }
}

/// The normalized `kind` token assigned to an event during abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    ToolCall,
    ToolResult,
    LlmRequest,
    LlmResponse,
    Message,
    Observation,
    Error,
}

/// A raw event as received from the instrumentation sink, before
/// canonicalization. `event_id` is absent in fresh emissions and computed by
/// the canonicalizer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawEvent {
    #[serde(default)]
    pub schema_version: Option<String>,
    pub event_type: EventType,
    pub seq: i64,
    pub run_id: String,
    pub rel_ms: i64,
    pub payload: Value,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
    #[serde(default)]
    pub event_id: Option<String>,
}

impl RawEvent {
    /// Validate the envelope-level shape required by §3.1/§6.1, independent
    /// of canonicalization. Returns the event type unchanged on success.
    pub fn validate_shape(&self) -> Result<(), TrtError> {
        if let Some(v) = &self.schema_version
            && v != SCHEMA_VERSION
        {
            return Err(TrtError::SchemaVersionUnsupported { found: v.clone() });
        }
        if self.seq <= 0 {
            return Err(TrtError::InvalidEventShape {
                reason: format!("seq must be a positive integer, got {}", self.seq),
            });
        }
        if self.run_id.is_empty() {
            return Err(TrtError::InvalidEventShape {
                reason: "run_id must not be empty".to_string(),
            });
        }
        required_payload_fields(self.event_type, &self.payload)?;
        Ok(())
    }
}

fn required_payload_fields(event_type: EventType, payload: &Value) -> Result<(), TrtError> {
    let obj = payload.as_object().ok_or_else(|| TrtError::InvalidEventShape {
        reason: format!("{event_type} payload must be a JSON object"),
    })?;
    let need = |key: &str| -> Result<(), TrtError> {
        if obj.contains_key(key) {
            Ok(())
        } else {
            Err(TrtError::InvalidEventShape {
                reason: format!("{event_type} payload missing required field `{key}`"),
            })
        }
    };
    match event_type {
        EventType::RunStarted => need("spec_name"),
        EventType::AgentStep => need("name"),
        EventType::LlmCalled => {
            need("provider")?;
            need("model")?;
            if !obj.contains_key("messages") && !obj.contains_key("prompt") {
                return Err(TrtError::InvalidEventShape {
                    reason: "llm_called payload needs `messages` or `prompt`".to_string(),
                });
            }
            Ok(())
        }
        EventType::LlmReturned => {
            need("provider")?;
            need("model")?;
            need("output")
        }
        EventType::ToolCalled => {
            need("tool_name")?;
            need("input")
        }
        EventType::ToolReturned => need("tool_name"),
        EventType::RunFinished => need("status"),
    }
}

/// A normalized, canonicalized event: stable across key reordering, volatile
/// fields stripped, `event_id` computed, and carrying the abstraction `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedEvent {
    pub event_type: EventType,
    pub seq: i64,
    pub rel_ms: i64,
    pub payload: Value,
    pub meta: BTreeMap<String, Value>,
    pub event_id: String,
    pub kind: Kind,
}

impl NormalizedEvent {
    /// The tool name carried by a `tool_called`/`tool_returned` event, if any.
    pub fn tool_name(&self) -> Option<&str> {
        self.payload.get("tool_name").and_then(Value::as_str)
    }

    /// Whether this event represents a tool result carrying an `error` field.
    pub fn is_tool_error(&self) -> bool {
        self.event_type == EventType::ToolReturned
            && self
                .payload
                .get("error")
                .is_some_and(|v| !v.is_null())
    }
}

/// Assign the normalized `kind` token for an event, given its type and
/// (already-stripped) payload. `tool_returned` events carrying a non-null
/// `error` field are classified as [`Kind::Error`] rather than
/// [`Kind::ToolResult`].
pub fn kind_for(event_type: EventType, payload: &Value) -> Kind {
    match event_type {
        EventType::ToolCalled => Kind::ToolCall,
        EventType::ToolReturned => {
            if payload.get("error").is_some_and(|v| !v.is_null()) {
                Kind::Error
            } else {
                Kind::ToolResult
            }
        }
        EventType::LlmCalled => Kind::LlmRequest,
        EventType::LlmReturned => Kind::LlmResponse,
        EventType::AgentStep => Kind::Message,
        EventType::RunStarted | EventType::RunFinished => Kind::Observation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_positive_seq() {
        let ev = RawEvent {
            schema_version: None,
            event_type: EventType::RunStarted,
            seq: 0,
            run_id: "r1".into(),
            rel_ms: 0,
            payload: json!({"spec_name": "x"}),
            meta: BTreeMap::new(),
            event_id: None,
        };
        assert!(ev.validate_shape().is_err());
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let ev = RawEvent {
            schema_version: Some("v2".into()),
            event_type: EventType::RunStarted,
            seq: 1,
            run_id: "r1".into(),
            rel_ms: 0,
            payload: json!({"spec_name": "x"}),
            meta: BTreeMap::new(),
            event_id: None,
        };
        assert!(matches!(
            ev.validate_shape(),
            Err(TrtError::SchemaVersionUnsupported { .. })
        ));
    }

    #[test]
    fn missing_schema_version_defaults_to_v1() {
        let ev = RawEvent {
            schema_version: None,
            event_type: EventType::ToolCalled,
            seq: 2,
            run_id: "r1".into(),
            rel_ms: 5,
            payload: json!({"tool_name": "fetch", "input": {"args": [], "kwargs": {}}}),
            meta: BTreeMap::new(),
            event_id: None,
        };
        assert!(ev.validate_shape().is_ok());
    }

    #[test]
    fn tool_returned_with_error_is_error_kind() {
        let k = kind_for(EventType::ToolReturned, &json!({"tool_name": "x", "error": "boom"}));
        assert_eq!(k, Kind::Error);
        let k = kind_for(EventType::ToolReturned, &json!({"tool_name": "x", "output": 1}));
        assert_eq!(k, Kind::ToolResult);
    }
}
