// SPDX-License-Identifier: MIT OR Apache-2.0

//! `contracts.network.*` and `contracts.data_leak.*` (§4.5 "Network", "Data leak").

use serde_json::Value;

use trt_core::error::ErrorCode;
use trt_core::event::{Kind, NormalizedEvent};
use trt_core::pii::contains_pii;
use trt_core::spec::{DataLeakContract, NetworkContract};
use trt_core::trace::Trace;
use trt_core::violation::Violation;

use crate::{kind_label, violation};

fn collect_domains(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if (k == "domain" || k == "host") && let Some(s) = v.as_str() {
                    out.push(s.to_string());
                }
                collect_domains(v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_domains(item, out);
            }
        }
        _ => {}
    }
}

fn scan_strings_for_pii(value: &Value) -> bool {
    match value {
        Value::String(s) => contains_pii(s),
        Value::Array(items) => items.iter().any(scan_strings_for_pii),
        Value::Object(map) => map.values().any(scan_strings_for_pii),
        _ => false,
    }
}

fn is_outbound(event: &NormalizedEvent) -> bool {
    matches!(event.kind, Kind::ToolCall | Kind::LlmRequest)
}

pub(crate) fn evaluate(cfg: &NetworkContract, trace: &Trace, violations: &mut Vec<Violation>) {
    if cfg.default != trt_core::spec::NetworkDefault::Deny {
        return;
    }
    let allowlist = cfg.effective_allowlist();
    for event in trace.events.iter().filter(|e| is_outbound(e)) {
        let mut domains = Vec::new();
        collect_domains(&event.payload, &mut domains);
        for domain in domains {
            if !allowlist.contains(&domain) {
                violations.push(violation(
                    ErrorCode::ContractNetworkDenied,
                    event.seq,
                    format!("outbound request to `{domain}` is not in the network allowlist"),
                ));
            }
        }
    }
}

pub(crate) fn data_leak(cfg: &DataLeakContract, trace: &Trace, violations: &mut Vec<Violation>) {
    if !cfg.deny_pii_outbound || cfg.outbound_kinds.is_empty() {
        return;
    }
    for event in &trace.events {
        if !cfg.outbound_kinds.contains(kind_label(event.kind)) {
            continue;
        }
        if scan_strings_for_pii(&event.payload) {
            violations.push(violation(
                ErrorCode::ContractDataLeakPii,
                event.seq,
                "outbound payload contains personally identifiable information",
            ));
            return;
        }
    }
}
