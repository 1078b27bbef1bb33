// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Counterexample shrinker (§4.8): bounded delta-debugging over a failing
//! candidate trace, producing a smaller trace that still fails with the
//! same `(failure_class, primary_code)`.
//!
//! This crate owns only the reduction search. Re-validation — rerunning
//! abstraction, the contract monitor, refinement, and the verdict resolver
//! against a candidate reduction — is supplied by the caller as a closure,
//! so `trt-shrink` does not depend on those crates and cannot itself
//! introduce a cycle into the pipeline.

use std::time::{Duration, Instant};

use trt_core::error::{ErrorCode, FailureClass};
use trt_core::event::{EventType, NormalizedEvent};

/// Bounds on how long the shrinker may search.
#[derive(Debug, Clone, Copy)]
pub struct ShrinkBudget {
    /// Wall-clock budget for the whole search.
    pub max_seconds: f64,
    /// Upper bound on the number of re-validation calls.
    pub max_iterations: usize,
}

impl Default for ShrinkBudget {
    fn default() -> Self {
        Self {
            max_seconds: 10.0,
            max_iterations: 500,
        }
    }
}

/// Outcome of one shrink search.
#[derive(Debug, Clone)]
pub struct ShrinkOutcome {
    /// The smallest trace found that still reproduces the target failure.
    /// Equal to the input when no reduction was accepted.
    pub events: Vec<NormalizedEvent>,
    /// Number of re-validation calls spent.
    pub iterations: usize,
    /// Whether any event was dropped.
    pub reduced: bool,
    /// `true` when the search stopped because a budget was exhausted
    /// rather than because it converged.
    pub budget_exhausted: bool,
}

fn rebuild(events: &[NormalizedEvent], removed: &[usize]) -> Vec<NormalizedEvent> {
    events
        .iter()
        .enumerate()
        .filter(|(i, _)| !removed.contains(i))
        .map(|(_, e)| e.clone())
        .collect()
}

/// Attempt to shrink `events` to a smaller trace that a re-validation
/// closure still reports as `(target_class, target_code)`.
///
/// `events` must already reproduce the target failure; `revalidate` returns
/// `Some((failure_class, primary_code))` when the candidate it is given
/// still fails, `None` on PASS or a different failure. `run_started` and
/// `run_finished` events are never candidates for removal (§4.8 step 1).
///
/// Uses the classic ddmin granularity-doubling search: partition the
/// removable events into `n` chunks, try dropping each chunk in turn: a
/// chunk whose removal still reproduces the failure is dropped for good and
/// `n` is reset to 2; if no chunk can be dropped, `n` doubles (finer
/// chunks) until it exceeds the number of remaining removable events, at
/// which point the search has converged.
pub fn shrink<F>(
    events: &[NormalizedEvent],
    target_class: FailureClass,
    target_code: ErrorCode,
    budget: ShrinkBudget,
    mut revalidate: F,
) -> ShrinkOutcome
where
    F: FnMut(&[NormalizedEvent]) -> Option<(FailureClass, ErrorCode)>,
{
    let deadline = Instant::now() + Duration::from_secs_f64(budget.max_seconds.max(0.0));
    let mut iterations = 0usize;
    let mut budget_exhausted = false;

    let mut removed: Vec<usize> = Vec::new();
    let mut remaining: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| !matches!(e.event_type, EventType::RunStarted | EventType::RunFinished))
        .map(|(i, _)| i)
        .collect();

    let mut granularity: usize = 2;

    'search: while !remaining.is_empty() && granularity <= remaining.len() {
        let chunk_size = remaining.len().div_ceil(granularity);
        let chunks: Vec<Vec<usize>> = remaining.chunks(chunk_size).map(<[usize]>::to_vec).collect();

        let mut shrank_this_round = false;
        for chunk in &chunks {
            if iterations >= budget.max_iterations || Instant::now() >= deadline {
                budget_exhausted = true;
                break 'search;
            }

            let mut candidate_removed = removed.clone();
            candidate_removed.extend_from_slice(chunk);
            let trial = rebuild(events, &candidate_removed);
            iterations += 1;

            if revalidate(&trial) == Some((target_class, target_code)) {
                removed = candidate_removed;
                remaining.retain(|i| !chunk.contains(i));
                granularity = granularity.saturating_sub(1).max(2);
                shrank_this_round = true;
                break;
            }
        }

        if !shrank_this_round {
            if granularity >= remaining.len() {
                break;
            }
            granularity = (granularity * 2).min(remaining.len());
        }
    }

    let reduced = !removed.is_empty();
    let events = if reduced {
        rebuild(events, &removed)
    } else {
        events.to_vec()
    };

    ShrinkOutcome {
        events,
        iterations,
        reduced,
        budget_exhausted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn event(seq: i64, event_type: EventType, tool_name: &str) -> NormalizedEvent {
        NormalizedEvent {
            event_type,
            seq,
            rel_ms: 0,
            payload: json!({"tool_name": tool_name, "input": {"args": [], "kwargs": {}}}),
            meta: BTreeMap::new(),
            event_id: format!("e{seq}"),
            kind: trt_core::event::kind_for(event_type, &json!({})),
        }
    }

    fn trace_with_extra_calls(n: usize) -> Vec<NormalizedEvent> {
        let mut events = vec![event(1, EventType::RunStarted, "")];
        for i in 0..n {
            events.push(event(2 + i as i64, EventType::ToolCalled, "noop"));
        }
        events.push(event(2 + n as i64, EventType::ToolCalled, "culprit"));
        events.push(event(3 + n as i64, EventType::RunFinished, ""));
        events
    }

    fn culprit_still_present(events: &[NormalizedEvent]) -> Option<(FailureClass, ErrorCode)> {
        if events.iter().any(|e| e.tool_name() == Some("culprit")) {
            Some((FailureClass::Refinement, ErrorCode::RefinementExtraToolCall))
        } else {
            None
        }
    }

    #[test]
    fn drops_irrelevant_events_while_keeping_the_culprit() {
        let events = trace_with_extra_calls(6);
        let outcome = shrink(
            &events,
            FailureClass::Refinement,
            ErrorCode::RefinementExtraToolCall,
            ShrinkBudget::default(),
            culprit_still_present,
        );
        assert!(outcome.reduced);
        assert!(outcome.events.iter().any(|e| e.tool_name() == Some("culprit")));
        assert!(outcome.events.len() < events.len());
        assert!(
            outcome
                .events
                .iter()
                .any(|e| e.event_type == EventType::RunStarted)
        );
        assert!(
            outcome
                .events
                .iter()
                .any(|e| e.event_type == EventType::RunFinished)
        );
    }

    #[test]
    fn never_reduces_when_nothing_is_droppable() {
        let events = vec![
            event(1, EventType::RunStarted, ""),
            event(2, EventType::ToolCalled, "culprit"),
            event(3, EventType::RunFinished, ""),
        ];
        let outcome = shrink(
            &events,
            FailureClass::Refinement,
            ErrorCode::RefinementExtraToolCall,
            ShrinkBudget::default(),
            culprit_still_present,
        );
        assert!(!outcome.reduced);
        assert_eq!(outcome.events.len(), events.len());
    }

    #[test]
    fn exhausted_iteration_budget_returns_best_effort_reduction() {
        let events = trace_with_extra_calls(20);
        let budget = ShrinkBudget {
            max_seconds: 10.0,
            max_iterations: 1,
        };
        let outcome = shrink(
            &events,
            FailureClass::Refinement,
            ErrorCode::RefinementExtraToolCall,
            budget,
            culprit_still_present,
        );
        assert!(outcome.iterations <= 1);
        assert!(outcome.budget_exhausted || !outcome.reduced);
    }
}
