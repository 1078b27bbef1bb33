// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz `ResolvedSpec` deserialization.
//!
//! A malformed or adversarial spec file must be rejected with a TOOLING
//! error, never panic, regardless of how deeply nested or how many unknown
//! keys it carries.
#![no_main]
use libfuzzer_sys::fuzz_target;
use trt_core::ResolvedSpec;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let _ = serde_json::from_str::<ResolvedSpec>(s);
});
