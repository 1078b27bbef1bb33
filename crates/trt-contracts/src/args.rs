// SPDX-License-Identifier: MIT OR Apache-2.0

//! `contracts.args.*` (§4.5 "Args"): per-tool keyword-argument schema checks.

use std::collections::BTreeMap;

use serde_json::Value;

use trt_core::error::ErrorCode;
use trt_core::event::Kind;
use trt_core::spec::ArgFieldSchema;
use trt_core::spec::ArgsSchema;
use trt_core::trace::Trace;
use trt_core::violation::Violation;

use crate::{violation, ContractMonitor};

fn kwargs_of(payload: &Value) -> &serde_json::Map<String, Value> {
    static EMPTY: std::sync::OnceLock<serde_json::Map<String, Value>> = std::sync::OnceLock::new();
    payload
        .get("input")
        .and_then(|v| v.get("kwargs"))
        .and_then(Value::as_object)
        .unwrap_or_else(|| EMPTY.get_or_init(serde_json::Map::new))
}

fn type_name_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn check_field(
    tool: &str,
    field: &str,
    value: &Value,
    constraint: &ArgFieldSchema,
    monitor: &ContractMonitor,
    seq: i64,
    violations: &mut Vec<Violation>,
) {
    if let Some(ty) = &constraint.field_type
        && !type_name_matches(value, ty)
    {
        violations.push(violation(
            ErrorCode::ContractArgType,
            seq,
            format!("tool `{tool}` arg `{field}` expected type `{ty}`"),
        ));
        return;
    }
    if let Some(n) = value.as_f64() {
        if let Some(min) = constraint.min
            && n < min
        {
            violations.push(violation(
                ErrorCode::ContractArgRange,
                seq,
                format!("tool `{tool}` arg `{field}` value {n} below min {min}"),
            ));
        }
        if let Some(max) = constraint.max
            && n > max
        {
            violations.push(violation(
                ErrorCode::ContractArgRange,
                seq,
                format!("tool `{tool}` arg `{field}` value {n} above max {max}"),
            ));
        }
    }
    if let Some(allowed) = &constraint.enum_values
        && !allowed.contains(value)
    {
        violations.push(violation(
            ErrorCode::ContractArgEnum,
            seq,
            format!("tool `{tool}` arg `{field}` is not one of the allowed values"),
        ));
    }
    if constraint.regex.is_some()
        && let Some(s) = value.as_str()
        && let Some(re) = monitor.arg_regex(tool, field)
        && !re.is_match(s)
    {
        violations.push(violation(
            ErrorCode::ContractArgRegex,
            seq,
            format!("tool `{tool}` arg `{field}` does not match the required pattern"),
        ));
    }
}

pub(crate) fn evaluate(
    schemas: &BTreeMap<String, ArgsSchema>,
    monitor: &ContractMonitor,
    trace: &Trace,
    violations: &mut Vec<Violation>,
) {
    if schemas.is_empty() {
        return;
    }
    for event in trace.events_of_kind(Kind::ToolCall) {
        let Some(name) = event.tool_name() else { continue };
        let Some(schema) = schemas.get(name) else { continue };
        let kwargs = kwargs_of(&event.payload);

        for required in &schema.required {
            if !kwargs.contains_key(required) {
                violations.push(violation(
                    ErrorCode::ContractArgRequiredMissing,
                    event.seq,
                    format!("tool `{name}` is missing required arg `{required}`"),
                ));
            }
        }
        for (field, constraint) in &schema.fields {
            if let Some(value) = kwargs.get(field) {
                check_field(name, field, value, constraint, monitor, event.seq, violations);
            }
        }
    }
}
