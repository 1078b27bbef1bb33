// SPDX-License-Identifier: MIT OR Apache-2.0
#![warn(missing_docs)]

//! Orchestrator (§4.9): spawns the agent subprocess, drives the pipeline
//! stages end to end, and persists baselines, reports, and counterexample
//! repros through the stores.
//!
//! `record` captures a baseline trace and fixture bundle from one run of the
//! agent. `run` resolves an existing baseline, replays the candidate under
//! the offline guard, and evaluates contracts/refinement/verdict, shrinking
//! on failure. Both spawn the agent the same way: a JSONL event stream read
//! from the child's stdout, stderr forwarded through `tracing` at `warn`.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use trt_abstraction::{abstract_trace, AbstractionConfig};
use trt_contracts::ContractMonitor;
use trt_core::canon::compile_redactions;
use trt_core::error::ErrorCode;
use trt_core::event::{EventType, Kind, NormalizedEvent, RawEvent};
use trt_core::spec::ResolvedSpec;
use trt_core::trace::Trace;
use trt_core::verdict::Verdict;
use trt_core::violation::Violation;
use trt_fixtures::{llm_signature, tool_signature, FixtureBundle, FixtureKind, FixtureWriter};
use trt_replay_guard::ReplayGuard;
use trt_shrink::{shrink, ShrinkBudget};
use trt_store::{ArtifactStore, BaselineRecord, BaselineStore, FsArtifactStore, FsBaselineStore};
use trt_telemetry::{MetricsCollector, RunMetrics, TelemetrySpan};

/// Normalizer version stamped on every baseline this orchestrator writes.
/// Bumped whenever canonicalization or abstraction changes in a way that
/// would make an old baseline unsafe to replay against.
pub const NORMALIZER_VERSION: &str = "trt-runner/1";

/// Options controlling one `record` invocation.
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    /// Bypasses the CI-write guard (§4.9). Mirrors the CLI's
    /// `--allow-ci-baseline-write` flag.
    pub allow_ci_baseline_write: bool,
}

/// Options controlling one `run` invocation. Currently empty; reserved for
/// per-run overrides (e.g. a one-off timeout) that do not belong in
/// [`trt_config::TrtConfig`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {}

/// Outcome of `record`.
#[derive(Debug, Clone)]
pub struct RecordReport {
    pub spec_name: String,
    pub event_count: usize,
    pub fixture_count: usize,
}

/// Outcome of `run`.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub spec_name: String,
    pub verdict: Verdict,
    pub candidate_events: Vec<NormalizedEvent>,
}

enum SpawnOutcome {
    Completed(Vec<RawEvent>),
    TimedOut { raws: Vec<RawEvent>, last_seq: i64 },
}

/// Drives the record/run pipeline for one or more specs against the
/// filesystem stores rooted at a [`trt_config::TrtConfig`].
#[derive(Clone)]
pub struct Orchestrator {
    config: trt_config::TrtConfig,
    baseline_store: FsBaselineStore,
    report_store: FsArtifactStore,
    repro_store: FsArtifactStore,
    metrics: MetricsCollector,
}

fn repro_command(spec: &ResolvedSpec) -> String {
    format!("trt run {}", spec.name)
}

fn call_key(event: &NormalizedEvent) -> String {
    match event.meta.get("call_id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => event.tool_name().unwrap_or_default().to_string(),
    }
}

fn abstraction_config_from_spec(spec: &ResolvedSpec) -> AbstractionConfig {
    AbstractionConfig {
        ignore_call_tools: spec.refinement.ignore_call_tools.clone(),
        refund_pattern: None,
        price_paths: Vec::new(),
    }
}

impl Orchestrator {
    /// Build an orchestrator over the stores rooted at `config.state_dir`.
    pub fn new(config: trt_config::TrtConfig) -> Self {
        let baseline_store =
            FsBaselineStore::new(config.baselines_dir(), config.fixtures_dir(), config.tmp_dir());
        let report_store = FsArtifactStore::new(config.reports_dir(), config.tmp_dir());
        let repro_store = FsArtifactStore::new(config.repros_dir(), config.tmp_dir());
        Self {
            config,
            baseline_store,
            report_store,
            repro_store,
            metrics: MetricsCollector::new(),
        }
    }

    /// Metrics recorded across every `record`/`run` call made on this
    /// orchestrator so far.
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Spawn the agent subprocess for `spec`, collecting every JSONL event
    /// line from stdout until EOF or `self.config.subprocess_timeout_secs`
    /// elapses. `extra_env` carries the replay guard's and fixture-replay
    /// env var contract; empty during `record`.
    async fn spawn_and_collect(
        &self,
        spec: &ResolvedSpec,
        extra_env: &[(String, String)],
    ) -> Result<SpawnOutcome> {
        let Some(program) = spec.command.first() else {
            bail!("spec `{}` has an empty command", spec.name);
        };
        let mut cmd = Command::new(program);
        cmd.args(&spec.command[1..]);
        if let Some(workdir) = &spec.workdir {
            cmd.current_dir(workdir);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        for (k, v) in extra_env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawn agent subprocess `{program}` for spec `{}`", spec.name))?;

        let stdout = child
            .stdout
            .take()
            .context("agent subprocess stdout unavailable")?;
        if let Some(stderr) = child.stderr.take() {
            let spec_name = spec.name.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            let s = line.trim_end();
                            if !s.is_empty() {
                                tracing::warn!(target: "trt_runner.stderr", spec_name = %spec_name, "{s}");
                            }
                        }
                    }
                }
            });
        }

        let mut lines = BufReader::new(stdout).lines();
        let mut raws = Vec::new();
        let mut last_seq = 0i64;
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.subprocess_timeout_secs);

        let timed_out = loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break true;
            }
            match tokio::time::timeout(remaining, lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let raw: RawEvent = serde_json::from_str(&line)
                        .with_context(|| format!("parse event line for spec `{}`", spec.name))?;
                    last_seq = raw.seq;
                    raws.push(raw);
                }
                Ok(Ok(None)) => break false,
                Ok(Err(e)) => return Err(e).context("read agent subprocess stdout"),
                Err(_) => break true,
            }
        };

        if timed_out {
            let _ = child.kill().await;
            let _ = child.wait().await;
            return Ok(SpawnOutcome::TimedOut { raws, last_seq });
        }

        let status = child.wait().await.context("wait for agent subprocess")?;
        tracing::debug!(spec_name = %spec.name, exit_status = ?status, "agent subprocess exited");
        Ok(SpawnOutcome::Completed(raws))
    }

    /// Record a baseline: run `spec` once, canonicalize the resulting trace,
    /// derive a fixture bundle from its LLM/tool call-result pairs, and
    /// persist both. Honors the CI-write guard (§4.9): under
    /// `TRAJECTLY_CI=1`, a write is refused unless
    /// `opts.allow_ci_baseline_write` is set or the config disables the
    /// guard.
    #[tracing::instrument(skip(self, spec, opts), fields(spec_name = %spec.name))]
    pub async fn record(&self, spec: &ResolvedSpec, opts: &RecordOptions) -> Result<RecordReport> {
        let span = TelemetrySpan::start("record", spec.name.clone());

        if trt_config::is_ci()
            && self.config.ci_baseline_write_requires_override
            && !opts.allow_ci_baseline_write
        {
            span.emit("denied", Some(ErrorCode::CiBaselineWriteDenied.as_str()));
            bail!(
                "{}: refusing to write a baseline under CI; pass --allow-ci-baseline-write to override",
                ErrorCode::CiBaselineWriteDenied
            );
        }

        let SpawnOutcome::Completed(raws) = self.spawn_and_collect(spec, &[]).await? else {
            span.emit("timeout", None);
            bail!(
                "{}: agent subprocess exceeded {}s while recording spec `{}`",
                ErrorCode::RunTimeout,
                self.config.subprocess_timeout_secs,
                spec.name
            );
        };

        let redactions = compile_redactions(&spec.redact).context("compile redact patterns")?;
        let trace = Trace::from_raw_events(&spec.name, &raws, &redactions)
            .context("canonicalize recorded trace")?;
        if let Err(errors) = trace.validate() {
            let detail = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
            bail!("{}: recorded trace failed validation: {detail}", ErrorCode::InvalidEventShape);
        }

        let fixtures = record_fixtures(&trace)?;
        let fixture_count = fixtures.entries.len();
        let record = BaselineRecord {
            normalizer_version: NORMALIZER_VERSION.to_string(),
            events: trace.events.clone(),
            fixtures,
        };
        self.baseline_store
            .write(&spec.name, &record)
            .with_context(|| format!("persist baseline for spec `{}`", spec.name))?;

        span.emit("recorded", None);
        self.metrics.record(RunMetrics {
            spec_name: spec.name.clone(),
            wall_clock: Duration::default(),
            event_count: trace.events.len(),
            violation_count: 0,
            violations_by_code: Default::default(),
            passed: true,
        });

        Ok(RecordReport {
            spec_name: spec.name.clone(),
            event_count: trace.events.len(),
            fixture_count,
        })
    }

    /// Resolve the baseline for `spec`, spawn a candidate run, and evaluate
    /// it through abstraction, the contract monitor, and refinement,
    /// resolving a final verdict. Shrinks a failing candidate before
    /// persisting its repro (§4.8). Fixtures recorded for `spec` are handed
    /// to the candidate through the same env var contract the offline
    /// replay guard uses (§4.3): `TRT_FIXTURE_BUNDLE` points the agent-side
    /// instrumentation SDK at a file it replays deterministic LLM/tool
    /// results from, rather than this process acting as an in-line network
    /// proxy.
    #[tracing::instrument(skip(self, spec, _opts), fields(spec_name = %spec.name))]
    pub async fn run(&self, spec: &ResolvedSpec, _opts: &RunOptions) -> Result<RunReport> {
        let span = TelemetrySpan::start("run", spec.name.clone());
        let started = std::time::Instant::now();

        let Some(baseline) = self
            .baseline_store
            .resolve(&spec.name)
            .with_context(|| format!("resolve baseline for spec `{}`", spec.name))?
        else {
            let verdict = trt_verdict::resolve(
                vec![Violation::new(
                    ErrorCode::BaselineMissing,
                    0,
                    format!("no baseline recorded for spec `{}`; run `trt record` first", spec.name),
                )],
                repro_command(spec),
            );
            self.persist_report(spec, &verdict).context("persist verdict report")?;
            span.emit("fail", Some(ErrorCode::BaselineMissing.as_str()));
            return Ok(RunReport {
                spec_name: spec.name.clone(),
                verdict,
                candidate_events: Vec::new(),
            });
        };

        let mut violations = Vec::new();
        if baseline.normalizer_version != NORMALIZER_VERSION {
            violations.push(Violation::new(
                ErrorCode::NormalizerVersionMismatch,
                0,
                format!(
                    "baseline normalizer_version {} != current {}; re-record the baseline",
                    baseline.normalizer_version, NORMALIZER_VERSION
                ),
            ));
        }

        let offline = spec.replay.mode == trt_core::spec::ReplayMode::Offline;
        let guard = offline.then(|| ReplayGuard::install(spec.contracts.network.effective_allowlist()));

        let fixtures_path = self
            .write_current_fixture_bundle(spec, &baseline.fixtures)
            .context("stage current fixture bundle")?;
        let mut extra_env = vec![(
            "TRT_FIXTURE_BUNDLE".to_string(),
            fixtures_path.to_string_lossy().into_owned(),
        )];
        if let Some(guard) = &guard {
            extra_env.extend(guard.subprocess_env());
        }

        let spawn_result = self.spawn_and_collect(spec, &extra_env).await;
        drop(guard);

        let raws = match spawn_result? {
            SpawnOutcome::Completed(raws) => raws,
            SpawnOutcome::TimedOut { raws, last_seq } => {
                violations.push(
                    Violation::new(
                        ErrorCode::RunTimeout,
                        if last_seq > 0 { last_seq } else { 1 },
                        format!(
                            "agent subprocess exceeded the configured {}s wall-clock timeout",
                            self.config.subprocess_timeout_secs
                        ),
                    )
                    .with_hint("raise subprocess_timeout_secs in trt.toml"),
                );
                raws
            }
        };

        let redactions = compile_redactions(&spec.redact).context("compile redact patterns")?;
        let candidate_trace = Trace::from_raw_events(&spec.name, &raws, &redactions)
            .context("canonicalize candidate trace")?;

        if let Err(errors) = candidate_trace.validate() {
            let anchor = candidate_trace.last_event().map(|e| e.seq).unwrap_or(1);
            for error in errors {
                violations.push(Violation::new(ErrorCode::InvalidEventShape, anchor, error.to_string()));
            }
        }

        let baseline_trace = Trace {
            run_id: spec.name.clone(),
            events: baseline.events.clone(),
        };
        let abstraction_config = abstraction_config_from_spec(spec);
        let baseline_abstraction = abstract_trace(&baseline_trace, &abstraction_config);
        let candidate_abstraction = abstract_trace(&candidate_trace, &abstraction_config);

        let write_tools = spec.contracts.side_effects.write_tools.clone();
        let run_finished_seq = candidate_trace.last_event().map(|e| e.seq).unwrap_or(0);
        let refinement = trt_refinement::check(
            &baseline_abstraction.skeleton,
            &candidate_abstraction.skeleton,
            &spec.refinement,
            &write_tools,
            run_finished_seq,
        );
        violations.extend(refinement.violations);

        let monitor = ContractMonitor::new(spec.contracts.clone(), spec.budget_thresholds.clone())
            .context("compile contract monitor")?;
        violations.extend(monitor.evaluate(&candidate_trace));

        let mut verdict = trt_verdict::resolve(violations, repro_command(spec));

        if !verdict.is_pass() {
            // §4.8: persist the candidate events up to and including the
            // witness unconditionally; this alone is sufficient, together
            // with the fixture bundle and spec, to re-derive the verdict.
            let witness = verdict.witness_index.unwrap_or(run_finished_seq);
            let mut prefix_events: Vec<NormalizedEvent> = candidate_trace
                .events
                .iter()
                .filter(|e| e.seq <= witness)
                .cloned()
                .collect();

            // Shrinking is an additional, optional refinement of that
            // prefix: if no reduction is accepted, the prefix computed
            // above is preserved unchanged (§4.8 "Failure").
            if let Some(target) = verdict.primary_violation.as_ref().map(|v| (v.failure_class, v.code)) {
                let budget = ShrinkBudget {
                    max_seconds: self.config.shrink_max_seconds as f64,
                    max_iterations: self.config.shrink_max_iterations as usize,
                };
                let spec_name = spec.name.clone();
                let refinement_cfg = spec.refinement.clone();
                let outcome = shrink(
                    &prefix_events,
                    target.0,
                    target.1,
                    budget,
                    |events| {
                        let trial_trace = Trace {
                            run_id: spec_name.clone(),
                            events: events.to_vec(),
                        };
                        let trial_abstraction = abstract_trace(&trial_trace, &abstraction_config);
                        let mut trial_violations = Vec::new();
                        let trial_finished = trial_trace.last_event().map(|e| e.seq).unwrap_or(0);
                        let rf = trt_refinement::check(
                            &baseline_abstraction.skeleton,
                            &trial_abstraction.skeleton,
                            &refinement_cfg,
                            &write_tools,
                            trial_finished,
                        );
                        trial_violations.extend(rf.violations);
                        trial_violations.extend(monitor.evaluate(&trial_trace));
                        let trial_verdict = trt_verdict::resolve(trial_violations, String::new());
                        trial_verdict.primary_violation.map(|v| (v.failure_class, v.code))
                    },
                );
                if outcome.reduced {
                    prefix_events = outcome.events;
                }
            }

            let key = self.persist_repro(spec, &prefix_events)?;
            verdict.counterexample_prefix_path = Some(key);
        }

        self.persist_report(spec, &verdict).context("persist verdict report")?;

        span.emit(if verdict.is_pass() { "pass" } else { "fail" }, None);
        let mut violations_by_code = std::collections::BTreeMap::new();
        for v in &verdict.all_violations {
            *violations_by_code.entry(v.code.as_str().to_string()).or_insert(0u64) += 1;
        }
        self.metrics.record(RunMetrics {
            spec_name: spec.name.clone(),
            wall_clock: started.elapsed(),
            event_count: candidate_trace.events.len(),
            violation_count: verdict.all_violations.len(),
            violations_by_code,
            passed: verdict.is_pass(),
        });

        Ok(RunReport {
            spec_name: spec.name.clone(),
            verdict,
            candidate_events: candidate_trace.events,
        })
    }

    /// Evaluate every spec in `specs` concurrently (§5), each with its own
    /// baseline resolution, replay guard, and pipeline run. Results are
    /// returned in completion order, not input order.
    pub async fn run_many(&self, specs: Vec<ResolvedSpec>) -> Vec<Result<RunReport>> {
        let mut set = tokio::task::JoinSet::new();
        for spec in specs {
            let orchestrator = self.clone();
            set.spawn(async move { orchestrator.run(&spec, &RunOptions::default()).await });
        }
        let mut results = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(join_err) => results.push(Err(anyhow::anyhow!("run task panicked: {join_err}"))),
            }
        }
        results
    }

    fn write_current_fixture_bundle(&self, spec: &ResolvedSpec, bundle: &FixtureBundle) -> Result<PathBuf> {
        let path = self.config.current_dir().join(format!("{}.fixtures.json", spec.name));
        bundle.save_atomic(&path).map_err(|e| anyhow::anyhow!(e))?;
        Ok(path)
    }

    fn persist_report(&self, spec: &ResolvedSpec, verdict: &Verdict) -> Result<()> {
        let body = serde_json::to_vec_pretty(verdict).context("serialize verdict report")?;
        self.report_store.put_bytes(&format!("{}.json", spec.name), &body)
    }

    fn persist_repro(&self, spec: &ResolvedSpec, events: &[NormalizedEvent]) -> Result<String> {
        let mut body = Vec::new();
        for event in events {
            serde_json::to_writer(&mut body, event).context("serialize repro event")?;
            body.push(b'\n');
        }
        let key = format!("{}.counterexample.prefix.jsonl", spec.name);
        self.repro_store.put_bytes(&key, &body)?;
        Ok(key)
    }
}

/// Derive a fixture bundle from a recorded trace's LLM and tool call/result
/// pairs, matched the same way [`Trace::validate`] pairs `tool_called` with
/// `tool_returned` (by `meta.call_id`, falling back to tool name). LLM calls
/// are paired FIFO since a single agent run issues them without overlap.
fn record_fixtures(trace: &Trace) -> Result<FixtureBundle> {
    let mut writer = FixtureWriter::new(NORMALIZER_VERSION);
    let mut pending_llm: VecDeque<&NormalizedEvent> = VecDeque::new();
    let mut pending_tools: std::collections::HashMap<String, &NormalizedEvent> =
        std::collections::HashMap::new();

    for event in &trace.events {
        match (event.event_type, event.kind) {
            (EventType::LlmCalled, _) => pending_llm.push_back(event),
            (EventType::LlmReturned, _) => {
                if let Some(request) = pending_llm.pop_front() {
                    let sig = llm_signature(&request.payload).map_err(|e| anyhow::anyhow!(e))?;
                    writer.record(FixtureKind::Llm, sig, event.payload.clone());
                }
            }
            (EventType::ToolCalled, _) => {
                pending_tools.insert(call_key(event), event);
            }
            (EventType::ToolReturned, Kind::ToolResult | Kind::Error) => {
                if let Some(request) = pending_tools.remove(&call_key(event)) {
                    let tool = request.tool_name().unwrap_or_default();
                    let args = request.payload.get("input").cloned().unwrap_or(Value::Null);
                    let sig = tool_signature(tool, &args).map_err(|e| anyhow::anyhow!(e))?;
                    writer.record(FixtureKind::Tool, sig, event.payload.clone());
                }
            }
            _ => {}
        }
    }

    Ok(writer.into_bundle())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

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

    #[test]
    fn record_fixtures_pairs_tool_calls_and_results() {
        let raws = vec![
            raw(EventType::RunStarted, 1, json!({"spec_name": "s"})),
            raw(
                EventType::ToolCalled,
                2,
                json!({"tool_name": "fetch", "input": {"args": [], "kwargs": {}}}),
            ),
            raw(EventType::ToolReturned, 3, json!({"tool_name": "fetch", "output": "ok"})),
            raw(EventType::RunFinished, 4, json!({"status": "ok"})),
        ];
        let trace = Trace::from_raw_events("r", &raws, &[]).unwrap();
        let bundle = record_fixtures(&trace).unwrap();
        assert_eq!(bundle.entries.len(), 1);
        assert_eq!(bundle.entries[0].kind, FixtureKind::Tool);
    }

    #[test]
    fn record_fixtures_pairs_llm_calls_fifo() {
        let raws = vec![
            raw(
                EventType::LlmCalled,
                1,
                json!({"provider": "p", "model": "m", "messages": []}),
            ),
            raw(
                EventType::LlmReturned,
                2,
                json!({"provider": "p", "model": "m", "output": "hi"}),
            ),
        ];
        let trace = Trace::from_raw_events("r", &raws, &[]).unwrap();
        let bundle = record_fixtures(&trace).unwrap();
        assert_eq!(bundle.entries.len(), 1);
        assert_eq!(bundle.entries[0].kind, FixtureKind::Llm);
    }

    #[test]
    fn repro_command_names_the_spec() {
        let spec: ResolvedSpec = serde_json::from_value(json!({
            "name": "checkout_flow",
            "command": ["./agent"],
        }))
        .unwrap();
        assert_eq!(repro_command(&spec), "trt run checkout_flow");
    }
}
