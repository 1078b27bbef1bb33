// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Refinement checker (§4.6): decides whether a baseline skeleton `S_b` is a
//! policy-aware subsequence of a candidate skeleton `S_n`, using the
//! leftmost-greedy embedding as the canonical tie-break when more than one
//! embedding exists.

use std::collections::BTreeSet;

use trt_core::error::ErrorCode;
use trt_core::skeleton::Skeleton;
use trt_core::spec::{RefinementConfig, RefinementMode};
use trt_core::violation::Violation;

/// Output of one refinement check.
#[derive(Debug, Clone)]
pub struct RefinementResult {
    pub violations: Vec<Violation>,
    /// Set when `S_b` is empty: refinement is trivially satisfied.
    pub vacuous: bool,
    /// The leftmost-greedy embedding `φ`, as candidate positions indexed by
    /// baseline position, present only when every baseline call matched.
    pub witness_embedding: Option<Vec<usize>>,
}

/// Compare a baseline skeleton against a candidate skeleton under `cfg`.
///
/// `write_tools` is the spec's declared set of side-effect tool names,
/// consulted for the `allow_extra_side_effect_tools` exemption.
/// `run_finished_seq` anchors a missing-call violation when the greedy
/// embedding runs off the end of the candidate.
pub fn check(
    baseline: &Skeleton,
    candidate: &Skeleton,
    cfg: &RefinementConfig,
    write_tools: &BTreeSet<String>,
    run_finished_seq: i64,
) -> RefinementResult {
    if cfg.mode == RefinementMode::None {
        return RefinementResult {
            violations: Vec::new(),
            vacuous: baseline.is_empty(),
            witness_embedding: None,
        };
    }

    if baseline.is_empty() {
        return RefinementResult {
            violations: Vec::new(),
            vacuous: true,
            witness_embedding: Some(Vec::new()),
        };
    }

    let mut violations = Vec::new();
    let mut matched = vec![false; candidate.calls.len()];
    let mut embedding = Vec::with_capacity(baseline.calls.len());
    let mut last_matched_pos: Option<usize> = None;
    let mut j = 0usize;
    let mut all_matched = true;

    for (_, name) in &baseline.calls {
        while j < candidate.calls.len() && candidate.calls[j].1 != *name {
            j += 1;
        }
        if j < candidate.calls.len() {
            matched[j] = true;
            embedding.push(j);
            last_matched_pos = Some(j);
            j += 1;
        } else {
            all_matched = false;
            let next_pos = last_matched_pos.map_or(0, |p| p + 1);
            let anchor = candidate
                .calls
                .get(next_pos)
                .map(|(seq, _)| *seq)
                .unwrap_or(run_finished_seq);
            violations.push(Violation::new(
                ErrorCode::RefinementBaselineCallMissing,
                anchor,
                format!("baseline call `{name}` has no matching candidate call"),
            ));
        }
    }

    let baseline_names: BTreeSet<&str> = baseline.calls.iter().map(|(_, n)| n.as_str()).collect();
    let exempt = cfg.exempt_names();
    let strict = cfg.mode == RefinementMode::Strict;

    let mut reported_new_name = false;
    for (idx, (seq, name)) in candidate.calls.iter().enumerate() {
        if matched[idx] {
            continue;
        }

        if !strict {
            let is_side_effect_exempt =
                write_tools.contains(name) && cfg.allow_extra_side_effect_tools.contains(name);
            let is_plain_exempt = cfg.allow_extra_tools.contains(name);
            if is_plain_exempt || is_side_effect_exempt {
                continue;
            }
        }

        violations.push(Violation::new(
            ErrorCode::RefinementExtraToolCall,
            *seq,
            format!("candidate call `{name}` is not part of the baseline and is not exempted"),
        ));
    }

    if !cfg.allow_new_tool_names {
        for (seq, name) in &candidate.calls {
            if !baseline_names.contains(name.as_str()) && !exempt.contains(name) {
                if !reported_new_name {
                    reported_new_name = true;
                    violations.push(Violation::new(
                        ErrorCode::RefinementNewToolNameForbidden,
                        *seq,
                        format!("candidate introduces new tool name `{name}`"),
                    ));
                }
                break;
            }
        }
    }

    let witness_embedding = if all_matched && embedding.len() == baseline.calls.len() {
        Some(embedding)
    } else {
        None
    };

    RefinementResult {
        violations,
        vacuous: false,
        witness_embedding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skeleton(names: &[(i64, &str)]) -> Skeleton {
        Skeleton {
            calls: names.iter().map(|(s, n)| (*s, n.to_string())).collect(),
        }
    }

    #[test]
    fn exact_match_produces_full_embedding_no_violations() {
        let baseline = skeleton(&[(1, "fetch"), (2, "store")]);
        let candidate = skeleton(&[(1, "fetch"), (2, "store")]);
        let cfg = RefinementConfig::default();
        let result = check(&baseline, &candidate, &cfg, &BTreeSet::new(), 3);
        assert!(result.violations.is_empty());
        assert_eq!(result.witness_embedding, Some(vec![0, 1]));
    }

    #[test]
    fn empty_baseline_is_vacuous() {
        let baseline = Skeleton::default();
        let candidate = skeleton(&[(1, "fetch")]);
        let cfg = RefinementConfig::default();
        let result = check(&baseline, &candidate, &cfg, &BTreeSet::new(), 2);
        assert!(result.vacuous);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn missing_baseline_call_anchors_past_last_match() {
        let baseline = skeleton(&[(1, "fetch"), (2, "store")]);
        let candidate = skeleton(&[(1, "fetch")]);
        let cfg = RefinementConfig::default();
        let result = check(&baseline, &candidate, &cfg, &BTreeSet::new(), 99);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].code, ErrorCode::RefinementBaselineCallMissing);
        assert_eq!(result.violations[0].event_index, 99);
    }

    #[test]
    fn unexempted_extra_call_is_a_violation() {
        let baseline = skeleton(&[(1, "fetch")]);
        let candidate = skeleton(&[(1, "fetch"), (2, "log_event")]);
        let cfg = RefinementConfig::default();
        let result = check(&baseline, &candidate, &cfg, &BTreeSet::new(), 3);
        assert!(result
            .violations
            .iter()
            .any(|v| v.code == ErrorCode::RefinementExtraToolCall));
    }

    #[test]
    fn exempted_extra_call_is_not_a_violation() {
        let baseline = skeleton(&[(1, "fetch")]);
        let candidate = skeleton(&[(1, "fetch"), (2, "log_event")]);
        let mut cfg = RefinementConfig::default();
        cfg.allow_extra_tools.insert("log_event".to_string());
        let result = check(&baseline, &candidate, &cfg, &BTreeSet::new(), 3);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn strict_mode_rejects_extra_call_even_if_exempted() {
        let baseline = skeleton(&[(1, "fetch")]);
        let candidate = skeleton(&[(1, "fetch"), (2, "log_event")]);
        let mut cfg = RefinementConfig::default();
        cfg.mode = RefinementMode::Strict;
        cfg.allow_extra_tools.insert("log_event".to_string());
        let result = check(&baseline, &candidate, &cfg, &BTreeSet::new(), 3);
        assert!(result
            .violations
            .iter()
            .any(|v| v.code == ErrorCode::RefinementExtraToolCall));
    }

    #[test]
    fn new_tool_name_forbidden_when_disallowed() {
        let baseline = skeleton(&[(1, "fetch")]);
        let candidate = skeleton(&[(1, "fetch"), (2, "shiny_new_tool")]);
        let mut cfg = RefinementConfig::default();
        cfg.allow_new_tool_names = false;
        cfg.allow_extra_tools.insert("shiny_new_tool".to_string());
        let result = check(&baseline, &candidate, &cfg, &BTreeSet::new(), 3);
        assert!(!result
            .violations
            .iter()
            .any(|v| v.code == ErrorCode::RefinementNewToolNameForbidden));

        cfg.allow_extra_tools.clear();
        let result = check(&baseline, &candidate, &cfg, &BTreeSet::new(), 3);
        assert!(result
            .violations
            .iter()
            .any(|v| v.code == ErrorCode::RefinementNewToolNameForbidden));
    }

    #[test]
    fn mode_none_emits_nothing() {
        let baseline = skeleton(&[(1, "fetch")]);
        let candidate = skeleton(&[(1, "other")]);
        let mut cfg = RefinementConfig::default();
        cfg.mode = RefinementMode::None;
        let result = check(&baseline, &candidate, &cfg, &BTreeSet::new(), 3);
        assert!(result.violations.is_empty());
        assert!(!result.vacuous);
    }

    #[test]
    fn leftmost_greedy_embedding_is_canonical() {
        let baseline = skeleton(&[(1, "a")]);
        let candidate = skeleton(&[(1, "a"), (2, "a")]);
        let cfg = RefinementConfig::default();
        let result = check(&baseline, &candidate, &cfg, &BTreeSet::new(), 3);
        assert_eq!(result.witness_embedding, Some(vec![0]));
        assert!(result
            .violations
            .iter()
            .any(|v| v.code == ErrorCode::RefinementExtraToolCall && v.event_index == 2));
    }
}
