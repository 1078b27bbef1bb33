// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration scenarios driving refinement + contract evaluation through
//! the same path the runner uses, without spawning a subprocess: build a
//! baseline and candidate trace, extract skeletons, run
//! `trt_refinement::check` and `ContractMonitor::evaluate`, then resolve a
//! verdict and assert on its shape.

mod support;

use std::collections::BTreeSet;

use trt_contracts::ContractMonitor;
use trt_core::error::{ErrorCode, FailureClass};
use trt_core::event::RawEvent;
use trt_core::skeleton::Skeleton;
use trt_core::spec::{
    BudgetThresholds, ContractsConfig, RefinementConfig, RequireBefore, SequenceContract, ToolsContract,
};
use trt_core::trace::Trace;

fn trace(run_id: &str, raws: Vec<RawEvent>) -> Trace {
    Trace::from_raw_events(run_id, &raws, &[]).expect("canonicalize")
}

fn resolve(
    baseline: &Trace,
    candidate: &Trace,
    refinement_cfg: &RefinementConfig,
    contracts: ContractsConfig,
    budgets: BudgetThresholds,
) -> trt_core::verdict::Verdict {
    let ignore = refinement_cfg.ignore_call_tools.clone();
    let baseline_skeleton = Skeleton::extract(baseline, &ignore);
    let candidate_skeleton = Skeleton::extract(candidate, &ignore);

    let run_finished_seq = candidate.last_event().map(|e| e.seq).unwrap_or(0);
    let refinement = trt_refinement::check(
        &baseline_skeleton,
        &candidate_skeleton,
        refinement_cfg,
        &contracts.side_effects.write_tools,
        run_finished_seq,
    );

    let monitor = ContractMonitor::new(contracts, budgets).expect("contracts compile");
    let mut violations = refinement.violations;
    violations.extend(monitor.evaluate(candidate));

    trt_verdict::resolve(violations, "trt run demo")
}

#[test]
fn full_pass_when_trace_matches_baseline_exactly() {
    let events = vec![
        support::run_started(1, "demo"),
        support::tool_called(2, "fetch_ticket"),
        support::tool_returned(3, "fetch_ticket"),
        support::run_finished(4, "ok"),
    ];
    let baseline = trace("demo", events.clone());
    let candidate = trace("demo", events);

    let verdict = resolve(
        &baseline,
        &candidate,
        &RefinementConfig::default(),
        ContractsConfig::default(),
        BudgetThresholds::default(),
    );

    assert!(verdict.is_pass());
    assert!(verdict.all_violations.is_empty());
}

/// A candidate that drops the baseline's second tool call and substitutes a
/// denied, previously-unseen tool name. Hand-verified violation set:
///
/// - `RefinementBaselineCallMissing` (the missing `store_triage` call)
/// - `RefinementExtraToolCall` (the unmatched `unsafe_export` call)
/// - `RefinementNewToolNameForbidden` (`unsafe_export` is a new name)
/// - `ContractToolDenied` (`unsafe_export` is deny-listed)
///
/// All four anchor at the candidate's single tool-call event (seq 4), so
/// `witness_index == 4` and every one of them lands in
/// `violations_at_witness`. The verdict resolver breaks the tie by
/// `(failure_class, code string, emission order)`: `Refinement` sorts before
/// `Contract`, and among the three refinement violations
/// `REFINEMENT_BASELINE_CALL_MISSING` sorts lexicographically first.
#[test]
fn denied_and_unrecognized_tool_call_reports_refinement_violation_first() {
    let baseline = trace(
        "demo",
        vec![
            support::run_started(1, "demo"),
            support::tool_called(2, "fetch_ticket"),
            support::tool_returned(3, "fetch_ticket"),
            support::tool_called(4, "store_triage"),
            support::tool_returned(5, "store_triage"),
            support::run_finished(6, "ok"),
        ],
    );
    let candidate = trace(
        "demo",
        vec![
            support::run_started(1, "demo"),
            support::tool_called(2, "fetch_ticket"),
            support::tool_returned(3, "fetch_ticket"),
            support::tool_called(4, "unsafe_export"),
            support::tool_returned(5, "unsafe_export"),
            support::run_finished(6, "ok"),
        ],
    );

    let mut refinement_cfg = RefinementConfig::default();
    refinement_cfg.allow_new_tool_names = false;

    let mut contracts = ContractsConfig::default();
    contracts.tools.deny = BTreeSet::from(["unsafe_export".to_string()]);

    let verdict = resolve(&baseline, &candidate, &refinement_cfg, contracts, BudgetThresholds::default());

    assert!(!verdict.is_pass());
    assert_eq!(verdict.witness_index, Some(4));
    assert_eq!(verdict.violations_at_witness.len(), 4);

    let codes: BTreeSet<ErrorCode> = verdict.violations_at_witness.iter().map(|v| v.code).collect();
    assert!(codes.contains(&ErrorCode::RefinementBaselineCallMissing));
    assert!(codes.contains(&ErrorCode::RefinementExtraToolCall));
    assert!(codes.contains(&ErrorCode::RefinementNewToolNameForbidden));
    assert!(codes.contains(&ErrorCode::ContractToolDenied));

    let primary = verdict.primary_violation.expect("fail has a primary violation");
    assert_eq!(primary.code, ErrorCode::RefinementBaselineCallMissing);
    assert_eq!(primary.failure_class, FailureClass::Refinement);
}

#[test]
fn extra_exempted_tool_call_passes_refinement_and_contracts() {
    let baseline = trace(
        "demo",
        vec![
            support::run_started(1, "demo"),
            support::tool_called(2, "fetch_ticket"),
            support::tool_returned(3, "fetch_ticket"),
            support::run_finished(4, "ok"),
        ],
    );
    let candidate = trace(
        "demo",
        vec![
            support::run_started(1, "demo"),
            support::tool_called(2, "fetch_ticket"),
            support::tool_returned(3, "fetch_ticket"),
            support::tool_called(4, "log_event"),
            support::tool_returned(5, "log_event"),
            support::run_finished(6, "ok"),
        ],
    );

    let mut refinement_cfg = RefinementConfig::default();
    refinement_cfg.allow_extra_tools = BTreeSet::from(["log_event".to_string()]);

    let verdict = resolve(
        &baseline,
        &candidate,
        &refinement_cfg,
        ContractsConfig::default(),
        BudgetThresholds::default(),
    );

    assert!(verdict.is_pass());
}

/// Baseline and candidate share an identical skeleton, so refinement
/// contributes zero violations and the only violation in play comes from
/// the sequence contract: `post_review` is called before `lint_code` in
/// both traces, which breaks a configured `require_before` obligation.
#[test]
fn sequence_require_before_violation_is_detected_independent_of_refinement() {
    let events = vec![
        support::run_started(1, "demo"),
        support::tool_called(2, "post_review"),
        support::tool_returned(3, "post_review"),
        support::tool_called(4, "lint_code"),
        support::tool_returned(5, "lint_code"),
        support::run_finished(6, "ok"),
    ];
    let baseline = trace("demo", events.clone());
    let candidate = trace("demo", events);

    let mut contracts = ContractsConfig::default();
    contracts.sequence = SequenceContract {
        require_before: vec![RequireBefore {
            before: "lint_code".to_string(),
            after: "post_review".to_string(),
        }],
        ..SequenceContract::default()
    };

    let verdict = resolve(
        &baseline,
        &candidate,
        &RefinementConfig::default(),
        contracts,
        BudgetThresholds::default(),
    );

    assert!(!verdict.is_pass());
    assert_eq!(verdict.all_violations.len(), 1);
    let violation = &verdict.all_violations[0];
    assert_eq!(violation.code, ErrorCode::SequenceRequireBefore);
    assert_eq!(violation.event_index, 2);
}

#[test]
fn deny_listed_tool_alone_is_a_pure_contract_failure() {
    let events = vec![
        support::run_started(1, "demo"),
        support::tool_called(2, "delete_repo"),
        support::tool_returned(3, "delete_repo"),
        support::run_finished(4, "ok"),
    ];
    let baseline = trace("demo", events.clone());
    let candidate = trace("demo", events);

    let mut contracts = ContractsConfig::default();
    contracts.tools = ToolsContract {
        deny: BTreeSet::from(["delete_repo".to_string()]),
        ..ToolsContract::default()
    };

    let verdict = resolve(
        &baseline,
        &candidate,
        &RefinementConfig::default(),
        contracts,
        BudgetThresholds::default(),
    );

    assert!(!verdict.is_pass());
    assert_eq!(verdict.all_violations.len(), 1);
    assert_eq!(verdict.all_violations[0].code, ErrorCode::ContractToolDenied);
    assert_eq!(verdict.primary_violation.unwrap().code, ErrorCode::ContractToolDenied);
}
