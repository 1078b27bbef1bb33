// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Verdict/witness resolver (§4.7): merges the violations collected from
//! refinement, the contract monitor, and tooling failures into a single
//! [`Verdict`], choosing a deterministic witness and primary violation when
//! more than one violation is observable.
//!
//! Resolution never reorders or drops violations: `all_violations` preserves
//! emission order (refinement, then contract families in their fixed
//! evaluation order, then tooling), and only the witness/primary choice is
//! computed from that set.

use trt_core::verdict::{Status, Verdict};
use trt_core::violation::Violation;

/// Resolve a verdict from the union of violations observed for one run.
///
/// `repro_command` is the literal command line that reproduces this run
/// (§6.4), already formatted by the orchestrator.
///
/// The witness is the smallest `event_index` across all violations. Among
/// violations sharing that index, the primary violation is chosen by
/// `failure_class` precedence (refinement before contract before tooling),
/// then by lexicographic `code`, then by emission order — the same order
/// `violations` arrives in, which callers must already produce
/// deterministically.
pub fn resolve(violations: Vec<Violation>, repro_command: impl Into<String>) -> Verdict {
    let repro_command = repro_command.into();
    if violations.is_empty() {
        return Verdict::pass(repro_command);
    }

    let witness_index = violations
        .iter()
        .map(|v| v.event_index)
        .min()
        .expect("non-empty violations has a minimum event_index");

    let mut violations_at_witness: Vec<(usize, Violation)> = violations
        .iter()
        .enumerate()
        .filter(|(_, v)| v.event_index == witness_index)
        .map(|(i, v)| (i, v.clone()))
        .collect();

    violations_at_witness.sort_by(|(ia, a), (ib, b)| {
        a.failure_class
            .cmp(&b.failure_class)
            .then_with(|| a.code.as_str().cmp(b.code.as_str()))
            .then_with(|| ia.cmp(ib))
    });

    let primary_violation = violations_at_witness.first().map(|(_, v)| v.clone());
    let violations_at_witness: Vec<Violation> =
        violations_at_witness.into_iter().map(|(_, v)| v).collect();

    Verdict {
        status: Status::Fail,
        witness_index: Some(witness_index),
        primary_violation,
        violations_at_witness,
        all_violations: violations,
        counterexample_prefix_path: None,
        repro_command,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trt_core::error::ErrorCode;

    #[test]
    fn no_violations_is_a_pass() {
        let verdict = resolve(Vec::new(), "trt run spec.yaml");
        assert!(verdict.is_pass());
    }

    #[test]
    fn witness_is_the_earliest_event_index() {
        let violations = vec![
            Violation::new(ErrorCode::ContractToolDenied, 5, "late"),
            Violation::new(ErrorCode::ContractNetworkDenied, 2, "early"),
        ];
        let verdict = resolve(violations, "trt run spec.yaml");
        assert_eq!(verdict.witness_index, Some(2));
        assert_eq!(verdict.primary_violation.unwrap().code, ErrorCode::ContractNetworkDenied);
    }

    #[test]
    fn tie_break_prefers_refinement_over_contract_at_same_index() {
        let violations = vec![
            Violation::new(ErrorCode::ContractToolDenied, 3, "contract"),
            Violation::new(ErrorCode::RefinementExtraToolCall, 3, "refinement"),
        ];
        let verdict = resolve(violations, "trt run spec.yaml");
        assert_eq!(
            verdict.primary_violation.unwrap().code,
            ErrorCode::RefinementExtraToolCall
        );
    }

    #[test]
    fn tie_break_falls_back_to_lexicographic_code_then_emission_order() {
        let violations = vec![
            Violation::new(ErrorCode::ContractToolNotAllowed, 1, "b"),
            Violation::new(ErrorCode::ContractNetworkDenied, 1, "a"),
            Violation::new(ErrorCode::ContractNetworkDenied, 1, "a-dup"),
        ];
        let verdict = resolve(violations, "trt run spec.yaml");
        let primary = verdict.primary_violation.unwrap();
        assert_eq!(primary.code, ErrorCode::ContractNetworkDenied);
        assert_eq!(primary.message, "a");
        assert_eq!(verdict.violations_at_witness.len(), 3);
    }

    #[test]
    fn all_violations_preserves_input_order_regardless_of_witness() {
        let violations = vec![
            Violation::new(ErrorCode::ContractToolDenied, 9, "first"),
            Violation::new(ErrorCode::ContractNetworkDenied, 1, "second"),
        ];
        let verdict = resolve(violations, "trt run spec.yaml");
        assert_eq!(verdict.all_violations[0].message, "first");
        assert_eq!(verdict.all_violations[1].message, "second");
    }
}
