// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! Stable error/violation codes and the top-level error type for the TRT engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three failure classes a [`crate::violation::Violation`] can belong to.
///
/// Ordering matters: `Ord` is derived in declaration order, which is the
/// class-precedence order used by the verdict resolver's tie-break rule
/// (refinement wins over contract, contract wins over tooling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureClass {
    /// Behavioral divergence from the baseline skeleton.
    Refinement,
    /// A declared policy obligation was violated.
    Contract,
    /// An infrastructural failure unrelated to agent behavior.
    Tooling,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Refinement => "REFINEMENT",
            Self::Contract => "CONTRACT",
            Self::Tooling => "TOOLING",
        };
        f.write_str(s)
    }
}

/// Stable, ASCII, machine-readable violation code.
///
/// Every variant renders to the exact identifier named in the error taxonomy;
/// callers that serialize a [`crate::violation::Violation`] rely on these
/// strings remaining stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // --- REFINEMENT ---
    RefinementBaselineCallMissing,
    RefinementExtraToolCall,
    RefinementNewToolNameForbidden,

    // --- CONTRACT ---
    ContractToolDenied,
    ContractToolNotAllowed,
    ContractMaxCallsTotalExceeded,
    ContractWriteToolDenied,
    ContractSequenceRequiredMissing,
    ContractSequenceNeverSeen,
    SequenceRequireBefore,
    ContractNetworkDenied,
    ContractDataLeakPii,
    /// `contracts.sequence.at_most_once` saw a second occurrence of a name.
    /// Not named as a distinct code in the error taxonomy (§7 groups it
    /// under "sequence"); kept distinct from [`Self::ContractSequenceNeverSeen`]
    /// because the two checks fail for opposite reasons (absence vs. excess).
    ContractSequenceAtMostOnceExceeded,
    ContractArgRequiredMissing,
    ContractArgType,
    ContractArgRange,
    ContractArgEnum,
    ContractArgRegex,
    BudgetLatencyExceeded,
    BudgetToolCallsExceeded,
    BudgetTokensExceeded,

    // --- TOOLING ---
    FixtureExhausted,
    NormalizerVersionMismatch,
    InvalidEventShape,
    SchemaVersionUnsupported,
    RunTimeout,
    CiBaselineWriteDenied,
    BaselineMissing,
    InternalError,
    /// The offline replay guard blocked an outbound network attempt before
    /// the contract monitor's network family ever saw it (§4.3, §8 property 7).
    /// Not part of the spec's original stable-code list; added because
    /// guard enforcement is a distinct failure mode from the post-hoc
    /// `CONTRACT_NETWORK_DENIED` check.
    ReplayNetworkBlocked,
}

impl ErrorCode {
    /// The stable ASCII identifier for this code, exactly as named in the
    /// error taxonomy.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RefinementBaselineCallMissing => "REFINEMENT_BASELINE_CALL_MISSING",
            Self::RefinementExtraToolCall => "REFINEMENT_EXTRA_TOOL_CALL",
            Self::RefinementNewToolNameForbidden => "REFINEMENT_NEW_TOOL_NAME_FORBIDDEN",
            Self::ContractToolDenied => "CONTRACT_TOOL_DENIED",
            Self::ContractToolNotAllowed => "CONTRACT_TOOL_NOT_ALLOWED",
            Self::ContractMaxCallsTotalExceeded => "CONTRACT_MAX_CALLS_TOTAL_EXCEEDED",
            Self::ContractWriteToolDenied => "CONTRACT_WRITE_TOOL_DENIED",
            Self::ContractSequenceRequiredMissing => "CONTRACT_SEQUENCE_REQUIRED_MISSING",
            Self::ContractSequenceNeverSeen => "CONTRACT_SEQUENCE_NEVER_SEEN",
            Self::SequenceRequireBefore => "SEQUENCE_REQUIRE_BEFORE",
            Self::ContractNetworkDenied => "CONTRACT_NETWORK_DENIED",
            Self::ContractDataLeakPii => "CONTRACT_DATA_LEAK_PII",
            Self::ContractSequenceAtMostOnceExceeded => "CONTRACT_SEQUENCE_AT_MOST_ONCE_EXCEEDED",
            Self::ContractArgRequiredMissing => "CONTRACT_ARG_REQUIRED_MISSING",
            Self::ContractArgType => "CONTRACT_ARG_TYPE",
            Self::ContractArgRange => "CONTRACT_ARG_RANGE",
            Self::ContractArgEnum => "CONTRACT_ARG_ENUM",
            Self::ContractArgRegex => "CONTRACT_ARG_REGEX",
            Self::BudgetLatencyExceeded => "BUDGET_LATENCY_EXCEEDED",
            Self::BudgetToolCallsExceeded => "BUDGET_TOOL_CALLS_EXCEEDED",
            Self::BudgetTokensExceeded => "BUDGET_TOKENS_EXCEEDED",
            Self::FixtureExhausted => "FIXTURE_EXHAUSTED",
            Self::NormalizerVersionMismatch => "NORMALIZER_VERSION_MISMATCH",
            Self::InvalidEventShape => "INVALID_EVENT_SHAPE",
            Self::SchemaVersionUnsupported => "SCHEMA_VERSION_UNSUPPORTED",
            Self::RunTimeout => "RUN_TIMEOUT",
            Self::CiBaselineWriteDenied => "CI_BASELINE_WRITE_DENIED",
            Self::BaselineMissing => "BASELINE_MISSING",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ReplayNetworkBlocked => "REPLAY_NETWORK_BLOCKED",
        }
    }

    /// The [`FailureClass`] this code belongs to.
    pub const fn failure_class(self) -> FailureClass {
        match self {
            Self::RefinementBaselineCallMissing
            | Self::RefinementExtraToolCall
            | Self::RefinementNewToolNameForbidden => FailureClass::Refinement,

            Self::ContractToolDenied
            | Self::ContractToolNotAllowed
            | Self::ContractMaxCallsTotalExceeded
            | Self::ContractWriteToolDenied
            | Self::ContractSequenceRequiredMissing
            | Self::ContractSequenceNeverSeen
            | Self::SequenceRequireBefore
            | Self::ContractNetworkDenied
            | Self::ContractDataLeakPii
            | Self::ContractSequenceAtMostOnceExceeded
            | Self::ContractArgRequiredMissing
            | Self::ContractArgType
            | Self::ContractArgRange
            | Self::ContractArgEnum
            | Self::ContractArgRegex
            | Self::BudgetLatencyExceeded
            | Self::BudgetToolCallsExceeded
            | Self::BudgetTokensExceeded => FailureClass::Contract,

            Self::FixtureExhausted
            | Self::NormalizerVersionMismatch
            | Self::InvalidEventShape
            | Self::SchemaVersionUnsupported
            | Self::RunTimeout
            | Self::CiBaselineWriteDenied
            | Self::BaselineMissing
            | Self::InternalError
            | Self::ReplayNetworkBlocked => FailureClass::Tooling,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for infrastructural failures in the canonicalizer
/// and the data model (as opposed to policy [`crate::violation::Violation`]s,
/// which are data, not errors).
#[derive(Debug, thiserror::Error)]
pub enum TrtError {
    /// `event_type` is unknown, `seq` is not a positive integer, or a
    /// required payload field for the type is absent.
    #[error("invalid event shape: {reason}")]
    InvalidEventShape {
        /// Human-readable description of the shape problem.
        reason: String,
    },

    /// `schema_version` is present on a raw event and is not `"v1"`.
    #[error("unsupported schema_version: {found}")]
    SchemaVersionUnsupported {
        /// The offending value.
        found: String,
    },

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// An invalid regular expression was supplied (e.g. in `redact`).
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// An implementation error that does not fit the declared taxonomy.
    #[error("internal error [{correlation_id}]: {reason}")]
    Internal {
        /// Opaque id for correlating with logs.
        correlation_id: Uuid,
        /// Human-readable description.
        reason: String,
    },
}

impl TrtError {
    /// The stable [`ErrorCode`] this error corresponds to.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidEventShape { .. } => ErrorCode::InvalidEventShape,
            Self::SchemaVersionUnsupported { .. } => ErrorCode::SchemaVersionUnsupported,
            Self::Serde(_) | Self::Pattern(_) => ErrorCode::InternalError,
            Self::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Build an [`TrtError::Internal`] with a freshly generated correlation id.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            correlation_id: Uuid::new_v4(),
            reason: reason.into(),
        }
    }
}
