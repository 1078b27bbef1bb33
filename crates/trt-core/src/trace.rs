// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! A finite ordered sequence of normalized events for a single run, and its
//! structural invariants (§3.2).

use std::fmt;

use regex::Regex;
use serde_json::Value;

use crate::canon::canonicalize;
use crate::error::TrtError;
use crate::event::{EventType, Kind, NormalizedEvent, RawEvent};

/// A single structural problem found by [`Trace::validate`]. Accumulated,
/// not short-circuited, mirroring the monitor's own evaluation discipline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    /// `seq` did not strictly increase from the previous event.
    NonSequentialSeq { previous: i64, found: i64 },
    /// The trace is empty.
    Empty,
    /// The first event is not `run_started`.
    NotStartedWithRunStarted,
    /// The last event is not `run_finished`.
    NotEndedWithRunFinished,
    /// A `tool_called` event has no matching `tool_returned` (and the run
    /// did not abort at `run_finished`).
    UnmatchedToolCall { seq: i64, tool_name: String },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonSequentialSeq { previous, found } => {
                write!(f, "seq {found} does not strictly follow {previous}")
            }
            Self::Empty => write!(f, "trace has no events"),
            Self::NotStartedWithRunStarted => write!(f, "trace does not start with run_started"),
            Self::NotEndedWithRunFinished => write!(f, "trace does not end with run_finished"),
            Self::UnmatchedToolCall { seq, tool_name } => {
                write!(f, "tool_called({tool_name}) at seq {seq} has no matching tool_returned")
            }
        }
    }
}

impl std::error::Error for TraceError {}

/// The call-id key used to pair a `tool_called` with its `tool_returned`.
/// Falls back to the tool name alone when `meta.call_id` is absent, which is
/// correct for the common case of non-concurrent tool calls.
fn call_key(event: &NormalizedEvent) -> String {
    match event.meta.get("call_id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => event.tool_name().unwrap_or_default().to_string(),
    }
}

/// A finite ordered sequence of normalized events belonging to one run.
#[derive(Debug, Clone)]
pub struct Trace {
    pub run_id: String,
    pub events: Vec<NormalizedEvent>,
}

impl Trace {
    /// Canonicalize a list of raw events captured for a single run into a
    /// [`Trace`]. Does not validate structural invariants; call
    /// [`Trace::validate`] separately.
    pub fn from_raw_events(
        run_id: impl Into<String>,
        raws: &[RawEvent],
        redactions: &[Regex],
    ) -> Result<Self, TrtError> {
        let events = raws
            .iter()
            .map(|r| canonicalize(r, redactions))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            run_id: run_id.into(),
            events,
        })
    }

    /// Validate the trace's structural invariants, accumulating every
    /// problem found rather than stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<TraceError>> {
        let mut errors = Vec::new();

        if self.events.is_empty() {
            return Err(vec![TraceError::Empty]);
        }

        let mut previous_seq: Option<i64> = None;
        for event in &self.events {
            if let Some(prev) = previous_seq
                && event.seq <= prev
            {
                errors.push(TraceError::NonSequentialSeq {
                    previous: prev,
                    found: event.seq,
                });
            }
            previous_seq = Some(event.seq);
        }

        if self.events.first().map(|e| e.event_type) != Some(EventType::RunStarted) {
            errors.push(TraceError::NotStartedWithRunStarted);
        }
        if self.events.last().map(|e| e.event_type) != Some(EventType::RunFinished) {
            errors.push(TraceError::NotEndedWithRunFinished);
        }

        let mut open_calls: Vec<(String, i64, String)> = Vec::new();
        for event in &self.events {
            match event.event_type {
                EventType::ToolCalled => {
                    let name = event.tool_name().unwrap_or_default().to_string();
                    open_calls.push((call_key(event), event.seq, name));
                }
                EventType::ToolReturned => {
                    let key = call_key(event);
                    if let Some(pos) = open_calls.iter().position(|(k, _, _)| *k == key) {
                        open_calls.remove(pos);
                    }
                }
                _ => {}
            }
        }
        for (_, seq, tool_name) in open_calls {
            errors.push(TraceError::UnmatchedToolCall { seq, tool_name });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Events of the given normalized [`Kind`], in emission order.
    pub fn events_of_kind(&self, kind: Kind) -> impl Iterator<Item = &NormalizedEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// The last event, if any.
    pub fn last_event(&self) -> Option<&NormalizedEvent> {
        self.events.last()
    }
}
