// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz `trt-config`'s TOML parser.
//!
//! Arbitrary TOML text must never panic the parser, whether or not it
//! happens to describe a valid `TrtConfig`.
#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let _ = trt_config::parse_toml(s);
});
