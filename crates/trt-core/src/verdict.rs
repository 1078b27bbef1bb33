// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! [`Verdict`]: the outcome of one spec evaluation (§3.6).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::violation::Violation;

/// Pass/fail outcome of a spec evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
}

/// The outcome of evaluating one spec: a status, the earliest witness (if
/// any), the deterministically-chosen primary violation, and the full
/// violation set. Owned by the orchestrator; violations are handed off by
/// value from their producing component.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Verdict {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_violation: Option<Violation>,
    pub violations_at_witness: Vec<Violation>,
    pub all_violations: Vec<Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterexample_prefix_path: Option<String>,
    pub repro_command: String,
}

impl Verdict {
    /// A `PASS` verdict: no violations at all.
    pub fn pass(repro_command: impl Into<String>) -> Self {
        Self {
            status: Status::Pass,
            witness_index: None,
            primary_violation: None,
            violations_at_witness: Vec::new(),
            all_violations: Vec::new(),
            counterexample_prefix_path: None,
            repro_command: repro_command.into(),
        }
    }

    /// Whether this verdict is `PASS`.
    pub fn is_pass(&self) -> bool {
        self.status == Status::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_has_no_witness() {
        let v = Verdict::pass("trt run spec.yaml");
        assert!(v.is_pass());
        assert!(v.witness_index.is_none());
        assert!(v.primary_violation.is_none());
    }
}
