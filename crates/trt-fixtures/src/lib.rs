// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Fixture store (§4.2): persists recorded LLM/tool results keyed by
//! signature or emission index, and replays them deterministically.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use trt_core::canon::{canonical_json, sha256_hex};
use trt_core::error::ErrorCode;
use trt_core::violation::Violation;

/// The two kinds of recorded fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FixtureKind {
    Llm,
    Tool,
}

/// Fixture matching discipline, independent of the spec's own enum so this
/// crate has no dependency on the full `ResolvedSpec` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// First unconsumed fixture with the matching signature.
    Signature { strict_sequence: bool },
    /// Ignore signatures; return the next fixture of the correct kind.
    Sequence,
}

/// One persisted fixture entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureEntry {
    pub kind: FixtureKind,
    pub signature: String,
    /// 1-based emission order of the kind-restricted subsequence.
    pub index: u64,
    pub value: Value,
    #[serde(default)]
    pub consumed: bool,
}

/// A persisted fixture bundle for one spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureBundle {
    pub normalizer_version: String,
    pub entries: Vec<FixtureEntry>,
}

impl FixtureBundle {
    /// Load a bundle from disk.
    pub fn load(path: &Path) -> Result<Self, trt_core::TrtError> {
        let content = fs::read_to_string(path)
            .map_err(|e| trt_core::TrtError::internal(format!("read fixture bundle: {e}")))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist the bundle via a temp-file-then-rename swap so a crash never
    /// leaves a half-written bundle at the final path.
    pub fn save_atomic(&self, path: &Path) -> Result<(), trt_core::TrtError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .map_err(|e| trt_core::TrtError::internal(format!("create fixture dir: {e}")))?;
        let tmp_path = parent.join(format!(
            ".{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("fixtures")
        ));
        let body = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, body)
            .map_err(|e| trt_core::TrtError::internal(format!("write fixture tmp file: {e}")))?;
        fs::rename(&tmp_path, path)
            .map_err(|e| trt_core::TrtError::internal(format!("rename fixture tmp file: {e}")))?;
        Ok(())
    }
}

/// Compute the `by_hash` signature for an LLM request: the canonical form of
/// provider, model, and messages/prompt (deterministic parameters may be
/// folded into `request` by the caller; non-deterministic ones must be
/// excluded before this call).
pub fn llm_signature(request: &Value) -> Result<String, trt_core::TrtError> {
    Ok(sha256_hex(canonical_json(request)?.as_bytes()))
}

/// Compute the `args_signature_match` signature for a tool call:
/// `(tool_name, canonical(args))`.
pub fn tool_signature(tool_name: &str, args: &Value) -> Result<String, trt_core::TrtError> {
    let keyed = serde_json::json!({ "tool_name": tool_name, "args": args });
    Ok(sha256_hex(canonical_json(&keyed)?.as_bytes()))
}

/// Append-only writer used while recording a baseline.
#[derive(Debug, Default)]
pub struct FixtureWriter {
    bundle: FixtureBundle,
    next_index: std::collections::BTreeMap<FixtureKind, u64>,
}

impl FixtureWriter {
    /// Start a fresh writer for the given normalizer version.
    pub fn new(normalizer_version: impl Into<String>) -> Self {
        Self {
            bundle: FixtureBundle {
                normalizer_version: normalizer_version.into(),
                entries: Vec::new(),
            },
            next_index: std::collections::BTreeMap::new(),
        }
    }

    /// Record one fixture, assigning it the next emission index for its kind.
    pub fn record(&mut self, kind: FixtureKind, signature: String, value: Value) {
        let index = self.next_index.entry(kind).or_insert(0);
        *index += 1;
        self.bundle.entries.push(FixtureEntry {
            kind,
            signature,
            index: *index,
            value,
            consumed: false,
        });
    }

    /// Finish recording, producing the bundle to persist.
    pub fn into_bundle(self) -> FixtureBundle {
        self.bundle
    }
}

/// Lookup-and-consume reader used while replaying a candidate.
pub struct FixtureReader {
    bundle: FixtureBundle,
    next_expected_index: std::collections::BTreeMap<FixtureKind, u64>,
}

/// Problems that can occur resolving a fixture during replay.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FixtureError {
    /// No unconsumed fixture matched the request.
    #[error("no fixture matched request")]
    Exhausted {
        /// The signature or index that failed to match, for diagnosis.
        request_detail: Value,
    },
    /// The bundle's recorded normalizer version disagrees with the current one.
    #[error("normalizer version mismatch: bundle={bundle}, current={current}")]
    VersionMismatch {
        /// Version recorded in the bundle.
        bundle: String,
        /// Version the replay is running with.
        current: String,
    },
}

impl FixtureError {
    /// Convert to a stable [`Violation`] anchored at `event_index`.
    pub fn to_violation(&self, event_index: i64) -> Violation {
        match self {
            Self::Exhausted { request_detail } => {
                Violation::new(ErrorCode::FixtureExhausted, event_index, "no fixture matched request")
                    .with_detail(request_detail.clone())
            }
            Self::VersionMismatch { bundle, current } => Violation::new(
                ErrorCode::NormalizerVersionMismatch,
                event_index,
                format!("fixture bundle normalizer_version {bundle} != current {current}"),
            ),
        }
    }
}

impl FixtureReader {
    /// Open a bundle for replay, checking the normalizer version up front.
    pub fn new(bundle: FixtureBundle, current_normalizer_version: &str) -> Result<Self, FixtureError> {
        if bundle.normalizer_version != current_normalizer_version {
            return Err(FixtureError::VersionMismatch {
                bundle: bundle.normalizer_version.clone(),
                current: current_normalizer_version.to_string(),
            });
        }
        Ok(Self {
            bundle,
            next_expected_index: std::collections::BTreeMap::new(),
        })
    }

    /// Resolve the next value for `kind`/`signature` under `mode`, marking
    /// the matched entry consumed.
    pub fn consume(
        &mut self,
        kind: FixtureKind,
        signature: &str,
        mode: MatchMode,
    ) -> Result<Value, FixtureError> {
        let expected = *self.next_expected_index.get(&kind).unwrap_or(&0) + 1;

        let position = match mode {
            MatchMode::Sequence => self
                .bundle
                .entries
                .iter()
                .position(|e| e.kind == kind && !e.consumed),
            MatchMode::Signature { strict_sequence } => self.bundle.entries.iter().position(|e| {
                e.kind == kind
                    && !e.consumed
                    && e.signature == signature
                    && (!strict_sequence || e.index == expected)
            }),
        };

        let Some(pos) = position else {
            return Err(FixtureError::Exhausted {
                request_detail: serde_json::json!({ "kind": kind, "signature": signature }),
            });
        };

        let entry = &mut self.bundle.entries[pos];
        entry.consumed = true;
        let index = entry.index;
        let value = entry.value.clone();
        self.next_expected_index.insert(kind, index);
        Ok(value)
    }
}
