// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Runtime configuration: the local state directory layout, CI detection for
//! the baseline-write guard, and logging defaults.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable that, when set to a truthy value, indicates the
/// orchestrator is running under CI (§4.9's CI-write guard).
pub const CI_ENV_VAR: &str = "TRAJECTLY_CI";

/// Recognised log levels for `RUST_LOG`-style overrides.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Failures loading or validating a [`TrtConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: String,
    },
    /// The configuration file was not valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Underlying parser message.
        reason: String,
    },
    /// The configuration parsed but failed validation.
    #[error("invalid config: {0}")]
    ValidationError(String),
}

/// A non-fatal configuration issue surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning(pub String);

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Top-level runtime configuration for the orchestrator and CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrtConfig {
    /// Root directory for `baselines/`, `fixtures/`, `current/`, `reports/`,
    /// `repros/`, `tmp/` (§6.3). Defaults to `.trt` under the working
    /// directory.
    pub state_dir: PathBuf,
    /// `RUST_LOG`-style default when the caller does not override it.
    pub log_level: Option<String>,
    /// Wall-clock timeout for the agent subprocess, in seconds.
    pub subprocess_timeout_secs: u64,
    /// Default wall-clock budget handed to the shrinker (`max_seconds`).
    pub shrink_max_seconds: u64,
    /// Default iteration budget handed to the shrinker (`max_iterations`).
    pub shrink_max_iterations: u64,
    /// Require `--allow-ci-baseline-write` to persist a new baseline under CI.
    pub ci_baseline_write_requires_override: bool,
}

impl Default for TrtConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".trt"),
            log_level: None,
            subprocess_timeout_secs: 120,
            shrink_max_seconds: 30,
            shrink_max_iterations: 200,
            ci_baseline_write_requires_override: true,
        }
    }
}

impl TrtConfig {
    /// `<state_dir>/baselines`.
    pub fn baselines_dir(&self) -> PathBuf {
        self.state_dir.join("baselines")
    }

    /// `<state_dir>/fixtures`.
    pub fn fixtures_dir(&self) -> PathBuf {
        self.state_dir.join("fixtures")
    }

    /// `<state_dir>/current`.
    pub fn current_dir(&self) -> PathBuf {
        self.state_dir.join("current")
    }

    /// `<state_dir>/reports`.
    pub fn reports_dir(&self) -> PathBuf {
        self.state_dir.join("reports")
    }

    /// `<state_dir>/repros`.
    pub fn repros_dir(&self) -> PathBuf {
        self.state_dir.join("repros")
    }

    /// `<state_dir>/tmp`, used for the temp-file-then-rename atomic write
    /// pattern shared by every store.
    pub fn tmp_dir(&self) -> PathBuf {
        self.state_dir.join("tmp")
    }
}

/// Load a [`TrtConfig`] from an optional TOML file, then apply environment
/// variable overrides. Returns [`TrtConfig::default`] when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<TrtConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => TrtConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`TrtConfig`].
pub fn parse_toml(content: &str) -> Result<TrtConfig, ConfigError> {
    toml::from_str::<TrtConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// Apply `TRT_*` environment variable overrides on top of a loaded config.
///
/// Recognised variables: `TRT_STATE_DIR`, `TRT_LOG_LEVEL`,
/// `TRT_SUBPROCESS_TIMEOUT_SECS`.
pub fn apply_env_overrides(config: &mut TrtConfig) {
    if let Ok(val) = std::env::var("TRT_STATE_DIR") {
        config.state_dir = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("TRT_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Ok(val) = std::env::var("TRT_SUBPROCESS_TIMEOUT_SECS")
        && let Ok(secs) = val.parse::<u64>()
    {
        config.subprocess_timeout_secs = secs;
    }
}

/// Validate a loaded configuration, returning advisory warnings. Hard errors
/// (an unrecognized `log_level`, a zero timeout) are returned as a
/// [`ConfigError::ValidationError`].
pub fn validate_config(config: &TrtConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    if config.subprocess_timeout_secs == 0 {
        errors.push("subprocess_timeout_secs must be greater than zero".into());
    }
    if config.subprocess_timeout_secs > 3600 {
        warnings.push(ConfigWarning(format!(
            "subprocess_timeout_secs of {}s is unusually large",
            config.subprocess_timeout_secs
        )));
    }

    if !errors.is_empty() {
        return Err(ConfigError::ValidationError(errors.join("; ")));
    }
    Ok(warnings)
}

/// Whether the process is running under CI, per [`CI_ENV_VAR`].
pub fn is_ci() -> bool {
    std::env::var(CI_ENV_VAR)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_cleanly() {
        let cfg = TrtConfig::default();
        assert!(validate_config(&cfg).unwrap().is_empty());
    }

    #[test]
    fn zero_timeout_is_a_hard_error() {
        let mut cfg = TrtConfig::default();
        cfg.subprocess_timeout_secs = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn large_timeout_is_a_warning_not_an_error() {
        let mut cfg = TrtConfig::default();
        cfg.subprocess_timeout_secs = 7200;
        let warnings = validate_config(&cfg).unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn state_dir_subpaths_are_relative_to_state_dir() {
        let cfg = TrtConfig {
            state_dir: PathBuf::from("/tmp/mystate"),
            ..TrtConfig::default()
        };
        assert_eq!(cfg.baselines_dir(), PathBuf::from("/tmp/mystate/baselines"));
        assert_eq!(cfg.tmp_dir(), PathBuf::from("/tmp/mystate/tmp"));
    }
}
