// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz the refinement checker's greedy embedding.
//!
//! Arbitrary baseline/candidate skeletons and policy knobs must never panic
//! the embedding search, regardless of how the tool names overlap or how
//! the exemption sets are configured.
#![no_main]
use std::collections::BTreeSet;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use trt_core::skeleton::Skeleton;
use trt_core::spec::{RefinementConfig, RefinementMode};
use trt_refinement::check;

#[derive(Debug, Arbitrary)]
struct Input {
    baseline_names: Vec<String>,
    candidate_names: Vec<String>,
    allow_extra_tools: Vec<String>,
    allow_extra_side_effect_tools: Vec<String>,
    write_tools: Vec<String>,
    allow_new_tool_names: bool,
    mode_selector: u8,
}

fn to_skeleton(names: Vec<String>) -> Skeleton {
    let calls = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| ((i + 1) as i64, name))
        .collect();
    Skeleton { calls }
}

fuzz_target!(|input: Input| {
    let mode = match input.mode_selector % 3 {
        0 => RefinementMode::None,
        1 => RefinementMode::Skeleton,
        _ => RefinementMode::Strict,
    };
    let cfg = RefinementConfig {
        mode,
        allow_extra_llm_steps: false,
        allow_extra_tools: input.allow_extra_tools.into_iter().collect(),
        allow_extra_side_effect_tools: input.allow_extra_side_effect_tools.into_iter().collect(),
        allow_new_tool_names: input.allow_new_tool_names,
        ignore_call_tools: BTreeSet::new(),
    };
    let write_tools: BTreeSet<String> = input.write_tools.into_iter().collect();
    let baseline = to_skeleton(input.baseline_names);
    let candidate = to_skeleton(input.candidate_names);

    let _ = check(&baseline, &candidate, &cfg, &write_tools, i64::MAX);
});
