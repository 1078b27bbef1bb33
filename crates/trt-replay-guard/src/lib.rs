// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Offline replay guard (§4.3): a scoped resource whose lifetime equals the
//! agent subprocess's lifetime. Enforcement happens at the subprocess
//! boundary, not via unsafe in-process socket interception — see
//! [`ReplayGuard::subprocess_env`].

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use trt_core::error::ErrorCode;
use trt_core::violation::Violation;

static INSTALLED: AtomicBool = AtomicBool::new(false);

const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// An outbound network attempt the guard refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDenied {
    pub host: String,
}

impl NetworkDenied {
    /// Convert to a stable TOOLING [`Violation`] anchored at `event_index`.
    pub fn to_violation(&self, event_index: i64) -> Violation {
        Violation::new(
            ErrorCode::ReplayNetworkBlocked,
            event_index,
            format!("offline replay guard blocked outbound connection to {}", self.host),
        )
        .with_hint("add the domain to contracts.network.allow_domains if this is expected")
    }
}

/// Scoped guard installed for the duration of one agent subprocess. Install
/// at child-process start; the guard uninstalls itself when dropped.
///
/// Enforcement is expressed through the environment contract handed to the
/// child (`subprocess_env`) plus [`ReplayGuard::check_host`], which the
/// orchestrator and contract monitor consult before treating traffic as
/// legitimate loopback/allowlisted use. The engine does not intercept raw
/// sockets in-process: doing so would require `unsafe`, which this
/// workspace forbids crate-wide.
#[derive(Debug)]
pub struct ReplayGuard {
    allow_domains: BTreeSet<String>,
}

impl ReplayGuard {
    /// Install the guard, permitting `allow_domains` as an exact-match
    /// side-channel allowlist even in offline mode.
    pub fn install(allow_domains: BTreeSet<String>) -> Self {
        INSTALLED.store(true, Ordering::SeqCst);
        Self { allow_domains }
    }

    /// Whether a guard is currently installed anywhere in this process.
    pub fn is_installed() -> bool {
        INSTALLED.load(Ordering::SeqCst)
    }

    /// Check whether `host` may be contacted under this guard. Loopback
    /// hosts and the configured allowlist are always permitted.
    pub fn check_host(&self, host: &str) -> Result<(), NetworkDenied> {
        if LOOPBACK_HOSTS.contains(&host) || self.allow_domains.contains(host) {
            return Ok(());
        }
        Err(NetworkDenied {
            host: host.to_string(),
        })
    }

    /// Environment variables communicating the offline contract to a spawned
    /// agent subprocess. The agent-side instrumentation SDK is expected to
    /// consult `TRT_OFFLINE` and refuse network use itself, reporting back a
    /// `tool_returned` error event rather than silently succeeding online.
    pub fn subprocess_env(&self) -> Vec<(String, String)> {
        vec![
            ("TRT_OFFLINE".to_string(), "1".to_string()),
            (
                "TRT_ALLOW_DOMAINS".to_string(),
                self.allow_domains.iter().cloned().collect::<Vec<_>>().join(","),
            ),
        ]
    }
}

impl Drop for ReplayGuard {
    fn drop(&mut self) {
        INSTALLED.store(false, Ordering::SeqCst);
    }
}
