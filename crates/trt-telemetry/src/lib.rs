// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Run-level metrics collection and `tracing` span helpers. Ambient
//! observability: carried regardless of which contract families a given
//! spec enables.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Serialize, Serializer};

fn serialize_duration_ms<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}

/// Metrics recorded for a single spec evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub spec_name: String,
    #[serde(serialize_with = "serialize_duration_ms")]
    pub wall_clock: Duration,
    pub event_count: usize,
    pub violation_count: usize,
    /// Violation counts keyed by stable code, sorted for deterministic output.
    pub violations_by_code: BTreeMap<String, u64>,
    pub passed: bool,
}

/// Aggregate statistics across every run recorded by a [`MetricsCollector`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSummary {
    pub total_runs: usize,
    pub passed: usize,
    pub failed: usize,
    pub violations_by_code: BTreeMap<String, u64>,
}

fn percentile(sorted_ms: &[u128], pct: f64) -> u128 {
    if sorted_ms.is_empty() {
        return 0;
    }
    let rank = ((pct / 100.0) * (sorted_ms.len() - 1) as f64).round() as usize;
    sorted_ms[rank.min(sorted_ms.len() - 1)]
}

/// Thread-safe collector shared across concurrently running specs
/// (§5 permits the orchestrator to evaluate multiple specs in parallel).
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    runs: Arc<Mutex<Vec<RunMetrics>>>,
}

impl MetricsCollector {
    /// A fresh, empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one run's metrics.
    pub fn record(&self, metrics: RunMetrics) {
        self.runs.lock().expect("metrics mutex poisoned").push(metrics);
    }

    /// Snapshot every recorded run.
    pub fn runs(&self) -> Vec<RunMetrics> {
        self.runs.lock().expect("metrics mutex poisoned").clone()
    }

    /// Aggregate the recorded runs into a [`MetricsSummary`].
    pub fn summary(&self) -> MetricsSummary {
        let runs = self.runs();
        let mut summary = MetricsSummary {
            total_runs: runs.len(),
            ..Default::default()
        };
        for run in &runs {
            if run.passed {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            for (code, count) in &run.violations_by_code {
                *summary.violations_by_code.entry(code.clone()).or_insert(0) += count;
            }
        }
        summary
    }

    /// p50/p95 wall-clock latency across recorded runs, in milliseconds.
    pub fn latency_percentiles(&self) -> (u128, u128) {
        let mut durations: Vec<u128> =
            self.runs().iter().map(|r| r.wall_clock.as_millis()).collect();
        durations.sort_unstable();
        (percentile(&durations, 50.0), percentile(&durations, 95.0))
    }
}

/// A named span over one pipeline stage, emitted via `tracing` on drop-free
/// completion (the caller calls [`TelemetrySpan::emit`] explicitly so the
/// emitted fields can include the stage's outcome).
pub struct TelemetrySpan {
    stage: &'static str,
    spec_name: String,
}

impl TelemetrySpan {
    /// Begin a span for `stage` of evaluating `spec_name`.
    pub fn start(stage: &'static str, spec_name: impl Into<String>) -> Self {
        Self {
            stage,
            spec_name: spec_name.into(),
        }
    }

    /// Emit a structured `tracing` event recording this stage's outcome.
    pub fn emit(&self, outcome: &str, detail: Option<&str>) {
        tracing::info!(
            stage = self.stage,
            spec_name = %self.spec_name,
            outcome,
            detail,
            "pipeline_stage"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, passed: bool, ms: u64) -> RunMetrics {
        let mut violations_by_code = BTreeMap::new();
        if !passed {
            violations_by_code.insert("CONTRACT_TOOL_DENIED".to_string(), 1);
        }
        RunMetrics {
            spec_name: name.to_string(),
            wall_clock: Duration::from_millis(ms),
            event_count: 10,
            violation_count: if passed { 0 } else { 1 },
            violations_by_code,
            passed,
        }
    }

    #[test]
    fn summary_aggregates_pass_fail_counts() {
        let collector = MetricsCollector::new();
        collector.record(sample("a", true, 10));
        collector.record(sample("b", false, 20));
        let summary = collector.summary();
        assert_eq!(summary.total_runs, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.violations_by_code["CONTRACT_TOOL_DENIED"], 1);
    }

    #[test]
    fn percentiles_are_sorted_and_bounded() {
        let collector = MetricsCollector::new();
        for ms in [10, 50, 100, 200, 500] {
            collector.record(sample("x", true, ms));
        }
        let (p50, p95) = collector.latency_percentiles();
        assert!(p50 <= p95);
        assert!(p95 <= 500);
    }
}
