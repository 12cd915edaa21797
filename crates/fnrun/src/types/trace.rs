//! Invocation trace events and the span view built from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ObjectRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationOutcome {
    Success,
    Failure,
    Pending,
}

/// What is being traced at the start of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceStart {
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<ObjectRef>,
}

/// Handle returned by `trace_start`, passed back to `trace_end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationTrace {
    pub invocation_id: String,
    /// Queue that receives the function's own trace events, when the tracer
    /// allocates one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_queue: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvocationTraceEvent {
    Start {
        invocation_id: String,
        /// Epoch millis.
        timestamp: i64,
        #[serde(flatten)]
        start: TraceStart,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trace_queue: Option<String>,
    },
    End {
        invocation_id: String,
        timestamp: i64,
        outcome: InvocationOutcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl InvocationTraceEvent {
    pub fn invocation_id(&self) -> &str {
        match self {
            Self::Start { invocation_id, .. } | Self::End { invocation_id, .. } => invocation_id,
        }
    }
}

/// One invocation as seen from its start and (optional) end event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationSpan {
    pub invocation_id: String,
    pub timestamp: i64,
    /// Until now for invocations still pending.
    pub duration_ms: i64,
    pub outcome: InvocationOutcome,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_queue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pair start and end events by invocation id. End events without a start are
/// ignored. Spans are ordered by start time.
pub fn create_invocation_spans(events: &[InvocationTraceEvent], now_ms: i64) -> Vec<InvocationSpan> {
    let mut ends: BTreeMap<&str, (i64, InvocationOutcome, Option<&String>)> = BTreeMap::new();
    for event in events {
        if let InvocationTraceEvent::End {
            invocation_id,
            timestamp,
            outcome,
            error,
        } = event
        {
            ends.insert(invocation_id.as_str(), (*timestamp, *outcome, error.as_ref()));
        }
    }

    let mut spans: Vec<InvocationSpan> = events
        .iter()
        .filter_map(|event| match event {
            InvocationTraceEvent::Start {
                invocation_id,
                timestamp,
                start,
                trace_queue,
            } => {
                let end = ends.get(invocation_id.as_str());
                let (duration_ms, outcome, error) = match end {
                    Some((ended, outcome, error)) => (ended - timestamp, *outcome, error.cloned()),
                    None => (now_ms - timestamp, InvocationOutcome::Pending, None),
                };
                Some(InvocationSpan {
                    invocation_id: invocation_id.clone(),
                    timestamp: *timestamp,
                    duration_ms,
                    outcome,
                    input: start.input.clone(),
                    target: start.target.clone(),
                    trigger: start.trigger.clone(),
                    trace_queue: trace_queue.clone(),
                    error,
                })
            }
            InvocationTraceEvent::End { .. } => None,
        })
        .collect();
    spans.sort_by_key(|span| span.timestamp);
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn start(id: &str, timestamp: i64) -> InvocationTraceEvent {
        InvocationTraceEvent::Start {
            invocation_id: id.into(),
            timestamp,
            start: TraceStart {
                input: json!({"n": 1}),
                target: Some(ObjectRef::new("fn-1")),
                trigger: None,
            },
            trace_queue: None,
        }
    }

    #[test]
    fn test_spans_pair_start_and_end() {
        let events = vec![
            start("b", 200),
            start("a", 100),
            InvocationTraceEvent::End {
                invocation_id: "a".into(),
                timestamp: 150,
                outcome: InvocationOutcome::Failure,
                error: Some("boom".into()),
            },
        ];
        let spans = create_invocation_spans(&events, 1_000);
        assert_eq!(spans.len(), 2);

        assert_eq!(spans[0].invocation_id, "a");
        assert_eq!(spans[0].duration_ms, 50);
        assert_eq!(spans[0].outcome, InvocationOutcome::Failure);
        assert_eq!(spans[0].error.as_deref(), Some("boom"));

        assert_eq!(spans[1].invocation_id, "b");
        assert_eq!(spans[1].outcome, InvocationOutcome::Pending);
        assert_eq!(spans[1].duration_ms, 800);
    }

    #[test]
    fn test_start_event_wire_shape() {
        let value = serde_json::to_value(start("a", 1)).expect("serialize");
        assert_eq!(value["type"], "start");
        assert_eq!(value["target"], json!({"@ref": "fn-1"}));
        assert_eq!(value["input"], json!({"n": 1}));
    }
}
