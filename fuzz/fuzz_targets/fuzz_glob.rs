// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz `IncludeExcludeGlobs` construction and matching.
//!
//! Arbitrary pattern strings must either compile or fail with a contained
//! error; once compiled, matching against an arbitrary candidate must never
//! panic.
#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use trt_glob::IncludeExcludeGlobs;

#[derive(Debug, Arbitrary)]
struct Input {
    include: Vec<String>,
    exclude: Vec<String>,
    candidate: String,
}

fuzz_target!(|input: Input| {
    let Ok(globs) = IncludeExcludeGlobs::new(&input.include, &input.exclude) else {
        return;
    };
    let _ = globs.decide_str(&input.candidate);
});
