// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Canonical event model, trace/skeleton extraction, the resolved spec type,
//! and the stable error taxonomy shared by every stage of the TRT pipeline.
//!
//! This crate has no knowledge of contracts, refinement, or orchestration —
//! it defines the data every other `trt-*` crate operates on.

pub mod canon;
pub mod error;
pub mod event;
pub mod pii;
pub mod skeleton;
pub mod spec;
pub mod trace;
pub mod violation;
pub mod verdict;

pub use canon::{canonical_json, canonicalize, compile_redactions, sha256_hex};
pub use error::{ErrorCode, FailureClass, TrtError};
pub use event::{EventType, Kind, NormalizedEvent, RawEvent, SCHEMA_VERSION};
pub use skeleton::Skeleton;
pub use spec::ResolvedSpec;
pub use trace::{Trace, TraceError};
pub use verdict::{Status, Verdict};
pub use violation::Violation;
