// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz `RawEvent` deserialization and canonicalization.
//!
//! Feeds arbitrary byte strings through `serde_json::from_str::<RawEvent>`
//! and, on success, through `canonicalize`. Neither step should ever panic,
//! regardless of how malformed or adversarial the payload shape is.
#![no_main]
use libfuzzer_sys::fuzz_target;
use trt_core::RawEvent;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(raw) = serde_json::from_str::<RawEvent>(s) else {
        return;
    };

    let _ = trt_core::canonicalize(&raw, &[]);
});
