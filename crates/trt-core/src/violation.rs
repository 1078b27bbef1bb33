// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! [`Violation`]: the record produced by the contract monitor and the
//! refinement checker (§3.5).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, FailureClass};

/// A single violation observed at a specific event index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Violation {
    pub code: ErrorCode,
    pub failure_class: FailureClass,
    /// 1-based `seq` of the event at which the violation is observable.
    pub event_index: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl Violation {
    /// Build a violation, deriving `failure_class` from `code`.
    pub fn new(code: ErrorCode, event_index: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            failure_class: code.failure_class(),
            event_index,
            message: message.into(),
            hint: None,
            detail: None,
        }
    }

    /// Attach a hint for the user-facing report.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach free-form diagnostic detail (e.g. a fixture request canon).
    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_failure_class() {
        let v = Violation::new(ErrorCode::ContractToolDenied, 3, "tool denied");
        assert_eq!(v.failure_class, FailureClass::Contract);
    }

    #[test]
    fn builder_methods_set_optional_fields() {
        let v = Violation::new(ErrorCode::RunTimeout, 1, "timed out")
            .with_hint("raise max_seconds")
            .with_detail(serde_json::json!({"elapsed_ms": 5000}));
        assert_eq!(v.hint.as_deref(), Some("raise max_seconds"));
        assert!(v.detail.is_some());
    }
}
