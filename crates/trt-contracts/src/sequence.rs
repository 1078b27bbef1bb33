// SPDX-License-Identifier: MIT OR Apache-2.0

//! `contracts.sequence.*` (§4.5 "Sequence").

use std::collections::BTreeSet;

use trt_core::error::ErrorCode;
use trt_core::event::Kind;
use trt_core::spec::SequenceContract;
use trt_core::trace::Trace;
use trt_core::violation::Violation;

use crate::violation;

pub(crate) fn evaluate(cfg: &SequenceContract, trace: &Trace, violations: &mut Vec<Violation>) {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut first_seen_at: std::collections::BTreeMap<&str, i64> = std::collections::BTreeMap::new();
    let mut occurrences: std::collections::BTreeMap<&str, u32> = std::collections::BTreeMap::new();

    let forbidden: BTreeSet<&str> = cfg
        .forbid
        .iter()
        .chain(cfg.never.iter())
        .map(String::as_str)
        .collect();
    let at_most_once: BTreeSet<&str> = cfg.at_most_once.iter().map(String::as_str).collect();

    for event in trace.events_of_kind(Kind::ToolCall) {
        let Some(name) = event.tool_name() else { continue };
        seen.insert(name);
        first_seen_at.entry(name).or_insert(event.seq);
        let count = occurrences.entry(name).or_insert(0);
        *count += 1;

        if forbidden.contains(name) && *count == 1 {
            violations.push(violation(
                ErrorCode::ContractSequenceNeverSeen,
                event.seq,
                format!("tool `{name}` must never appear"),
            ));
        }
        if at_most_once.contains(name) && *count == 2 {
            violations.push(violation(
                ErrorCode::ContractSequenceAtMostOnceExceeded,
                event.seq,
                format!("tool `{name}` appeared more than once"),
            ));
        }
    }

    for rule in &cfg.require_before {
        let Some(&after_seq) = first_seen_at.get(rule.after.as_str()) else { continue };
        let before_seen_first = first_seen_at
            .get(rule.before.as_str())
            .is_some_and(|&seq| seq < after_seq);
        if !before_seen_first {
            violations.push(violation(
                ErrorCode::SequenceRequireBefore,
                after_seq,
                format!(
                    "`{}` must precede `{}`, but `{}` appeared first",
                    rule.before, rule.after, rule.after
                ),
            ));
        }
    }

    let required: BTreeSet<&str> = cfg
        .require
        .iter()
        .chain(cfg.eventually.iter())
        .map(String::as_str)
        .collect();
    if !required.is_empty()
        && let Some(finished) = trace.last_event()
    {
        for name in required {
            if !seen.contains(name) {
                violations.push(violation(
                    ErrorCode::ContractSequenceRequiredMissing,
                    finished.seq,
                    format!("tool `{name}` was required but never appeared"),
                ));
            }
        }
    }
}
