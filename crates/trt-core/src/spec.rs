// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! The resolved spec: the core's sole input besides the baseline and
//! candidate traces (§3.4). Spec file parsing, `extends`/merge, and flag
//! handling all happen upstream of this type — the core only ever sees an
//! already-resolved, immutable [`ResolvedSpec`].

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

/// How fixtures are keyed for lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FixturePolicy {
    #[default]
    ByHash,
    ByIndex,
}

/// `online` vs `offline` replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    #[default]
    Offline,
    Online,
}

/// Fixture matching discipline for LLM calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LlmMatchMode {
    #[default]
    SignatureMatch,
    SequenceMatch,
}

/// Fixture matching discipline for tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ToolMatchMode {
    #[default]
    ArgsSignatureMatch,
    SequenceMatch,
}

/// Refinement checker mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefinementMode {
    None,
    #[default]
    Skeleton,
    Strict,
}

/// Network policy default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NetworkDefault {
    #[default]
    Allow,
    Deny,
}

/// Replay-related options (§3.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct ReplayConfig {
    pub mode: ReplayMode,
    pub strict_sequence: bool,
    pub llm_match_mode: LlmMatchMode,
    pub tool_match_mode: ToolMatchMode,
}

/// Refinement-related options (§3.4, §4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct RefinementConfig {
    pub mode: RefinementMode,
    pub allow_extra_llm_steps: bool,
    pub allow_extra_tools: BTreeSet<String>,
    pub allow_extra_side_effect_tools: BTreeSet<String>,
    #[serde(default = "default_true")]
    pub allow_new_tool_names: bool,
    pub ignore_call_tools: BTreeSet<String>,
}

impl RefinementConfig {
    /// All names the checker treats as name-allowed regardless of origin.
    pub fn exempt_names(&self) -> BTreeSet<String> {
        self.allow_extra_tools
            .union(&self.allow_extra_side_effect_tools)
            .cloned()
            .collect()
    }
}

/// `contracts.tools.*` (§3.4, §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct ToolsContract {
    pub allow: BTreeSet<String>,
    pub deny: BTreeSet<String>,
    pub max_calls_total: Option<u64>,
    pub max_calls_per_tool: BTreeMap<String, u64>,
}

/// `contracts.sequence.*` (§3.4, §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct SequenceContract {
    pub require: Vec<String>,
    pub forbid: Vec<String>,
    pub require_before: Vec<RequireBefore>,
    pub eventually: Vec<String>,
    pub never: Vec<String>,
    pub at_most_once: Vec<String>,
}

/// One `{before, after}` ordering obligation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RequireBefore {
    pub before: String,
    pub after: String,
}

/// `contracts.side_effects.*` (§3.4, §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct SideEffectsContract {
    pub deny_write_tools: bool,
    /// Tool names the caller tags as performing a write side effect;
    /// consulted by `deny_write_tools` and by the refinement checker's
    /// `allow_extra_side_effect_tools` exemption.
    pub write_tools: BTreeSet<String>,
}

/// `contracts.network.*` (§3.4, §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct NetworkContract {
    pub default: NetworkDefault,
    pub allow_domains: BTreeSet<String>,
    #[serde(default, alias = "allowlist")]
    pub allowlist: BTreeSet<String>,
}

impl NetworkContract {
    /// `allow_domains` and its `allowlist` synonym, merged.
    pub fn effective_allowlist(&self) -> BTreeSet<String> {
        self.allow_domains.union(&self.allowlist).cloned().collect()
    }
}

/// `contracts.data_leak.*` (§3.4, §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct DataLeakContract {
    pub deny_pii_outbound: bool,
    pub outbound_kinds: BTreeSet<String>,
}

/// One field constraint inside a tool's argument schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct ArgFieldSchema {
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(rename = "enum")]
    pub enum_values: Option<Vec<Value>>,
    pub regex: Option<String>,
}

/// One tool's argument schema: required keys plus per-field constraints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct ArgsSchema {
    pub required: Vec<String>,
    pub fields: BTreeMap<String, ArgFieldSchema>,
}

/// `contracts.*` (§3.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct ContractsConfig {
    pub tools: ToolsContract,
    pub sequence: SequenceContract,
    pub side_effects: SideEffectsContract,
    pub network: NetworkContract,
    pub data_leak: DataLeakContract,
    pub args: BTreeMap<String, ArgsSchema>,
}

/// `budget_thresholds.*` (§3.4, §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct BudgetThresholds {
    pub max_latency_ms: Option<i64>,
    pub max_tool_calls: Option<u64>,
    pub max_tokens: Option<u64>,
}

/// A fully resolved spec: the core's sole configuration input (§3.4).
///
/// Unknown top-level keys are captured into `extra` and surfaced as a
/// report-level warning rather than rejected (§6.2); unknown keys nested
/// inside a recognized section fail deserialization, since every section
/// struct is `deny_unknown_fields`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResolvedSpec {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub fixture_policy: FixturePolicy,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub refinement: RefinementConfig,
    #[serde(default)]
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub budget_thresholds: BudgetThresholds,
    #[serde(default)]
    pub redact: Vec<String>,
    /// Opaque. Two known values (`"0.3"`, `"0.4"`) have been observed
    /// upstream of this spec; the core never matches against a fixed value.
    #[serde(default)]
    pub schema_version: Option<String>,
    /// Unrecognized top-level keys, surfaced as a non-fatal warning.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
