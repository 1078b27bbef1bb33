// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use schemars::schema_for;
use tracing_subscriber::EnvFilter;

use trt_core::spec::ResolvedSpec;
use trt_core::verdict::{Status, Verdict};
use trt_runner::{Orchestrator, RecordOptions, RunOptions};

/// Verdict PASS, or a clean `record`/`inspect`.
const EXIT_PASS: i32 = 0;
/// Verdict FAIL: the candidate trajectory diverged from the baseline or
/// tripped a contract.
const EXIT_FAIL: i32 = 1;
/// Tooling failure: bad spec file, subprocess spawn error, missing baseline,
/// CI-write guard denial. Distinct from `EXIT_FAIL` so CI can tell "the
/// agent regressed" apart from "the harness couldn't run".
const EXIT_TOOLING: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "trt", version, about = "Trajectory refinement testing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Path to trt.toml. Defaults to `./trt.toml` if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a baseline trace and fixture bundle from one run of a spec.
    Record {
        /// Path to a spec JSON file.
        spec: PathBuf,

        /// Bypass the CI-write guard (refuses baseline writes under
        /// TRAJECTLY_CI by default).
        #[arg(long)]
        allow_ci_baseline_write: bool,
    },

    /// Run a spec's candidate against its recorded baseline.
    Run {
        /// Path to a spec JSON file.
        spec: PathBuf,
    },

    /// Print a previously persisted verdict report.
    Inspect {
        /// Path to a verdict report JSON file.
        report: PathBuf,
    },

    /// Print a JSON schema for a core type.
    Schema {
        #[arg(value_enum)]
        kind: SchemaArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchemaArg {
    /// JSON schema for a spec file (`ResolvedSpec`).
    Spec,
    /// JSON schema for a verdict report.
    Verdict,
}

fn load_spec(path: &Path) -> Result<ResolvedSpec> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("read spec file `{}`", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("parse spec file `{}`", path.display()))
}

fn load_verdict(path: &Path) -> Result<Verdict> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("read report file `{}`", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("parse report file `{}`", path.display()))
}

fn print_verdict(verdict: &Verdict) {
    match verdict.status {
        Status::Pass => println!("status:  PASS"),
        Status::Fail => println!("status:  FAIL"),
    }
    if let Some(witness) = verdict.witness_index {
        println!("witness: event #{witness}");
    }
    if let Some(primary) = &verdict.primary_violation {
        println!("code:    {}", primary.code);
        println!("class:   {}", primary.failure_class);
        println!("message: {}", primary.message);
        if let Some(hint) = &primary.hint {
            println!("hint:    {hint}");
        }
    }
    if verdict.all_violations.len() > 1 {
        println!("violations: {} total", verdict.all_violations.len());
    }
    if let Some(repro) = &verdict.counterexample_prefix_path {
        println!("repro:   {repro}");
    }
    println!("rerun:   {}", verdict.repro_command);
}

fn schema_json(kind: SchemaArg) -> Result<String> {
    let value = match kind {
        SchemaArg::Spec => serde_json::to_value(schema_for!(ResolvedSpec))?,
        SchemaArg::Verdict => serde_json::to_value(schema_for!(Verdict))?,
    };
    serde_json::to_string_pretty(&value).context("serialize schema")
}

fn cmd_schema(kind: SchemaArg) -> Result<()> {
    println!("{}", schema_json(kind)?);
    Ok(())
}

fn cmd_inspect(path: &Path) -> Result<i32> {
    let verdict = load_verdict(path)?;
    print_verdict(&verdict);
    Ok(if verdict.is_pass() { EXIT_PASS } else { EXIT_FAIL })
}

async fn cmd_record(spec_path: &Path, orchestrator: &Orchestrator, allow_ci_baseline_write: bool) -> Result<i32> {
    let spec = load_spec(spec_path)?;
    let opts = RecordOptions {
        allow_ci_baseline_write,
    };
    let report = orchestrator.record(&spec, &opts).await?;
    println!("recorded spec `{}`", report.spec_name);
    println!("events:   {}", report.event_count);
    println!("fixtures: {}", report.fixture_count);
    Ok(EXIT_PASS)
}

async fn cmd_run(spec_path: &Path, orchestrator: &Orchestrator) -> Result<i32> {
    let spec = load_spec(spec_path)?;
    let report = orchestrator.run(&spec, &RunOptions::default()).await?;
    print_verdict(&report.verdict);
    Ok(if report.verdict.is_pass() { EXIT_PASS } else { EXIT_FAIL })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("trt=debug")
    } else {
        EnvFilter::new("trt=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = run(cli).await;

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(EXIT_TOOLING);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Schema { kind } => {
            cmd_schema(kind)?;
            Ok(EXIT_PASS)
        }
        Commands::Inspect { report } => cmd_inspect(&report),
        Commands::Record {
            spec,
            allow_ci_baseline_write,
        } => {
            let config = trt_config::load_config(cli.config.as_deref()).context("load trt.toml")?;
            let orchestrator = Orchestrator::new(config);
            cmd_record(&spec, &orchestrator, allow_ci_baseline_write).await
        }
        Commands::Run { spec } => {
            let config = trt_config::load_config(cli.config.as_deref()).context("load trt.toml")?;
            let orchestrator = Orchestrator::new(config);
            cmd_run(&spec, &orchestrator).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_spec_is_valid_json() {
        cmd_schema(SchemaArg::Spec).unwrap();
    }

    #[test]
    fn schema_verdict_is_valid_json() {
        cmd_schema(SchemaArg::Verdict).unwrap();
    }
}
