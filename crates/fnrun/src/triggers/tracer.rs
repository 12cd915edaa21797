//! Invocation tracers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::traits::{InvocationTracer, QueueService};
use crate::types::{
    create_invocation_spans, InvocationOutcome, InvocationSpan, InvocationTrace,
    InvocationTraceEvent, TraceStart,
};

fn new_trace(trace_queue: Option<String>) -> InvocationTrace {
    InvocationTrace {
        invocation_id: uuid::Uuid::new_v4().to_string(),
        trace_queue,
    }
}

fn outcome(error: &Option<String>) -> InvocationOutcome {
    if error.is_some() {
        InvocationOutcome::Failure
    } else {
        InvocationOutcome::Success
    }
}

/// Logs invocation start and end as `tracing` events.
pub struct LogInvocationTracer;

#[async_trait]
impl InvocationTracer for LogInvocationTracer {
    async fn trace_start(&self, start: TraceStart) -> InvocationTrace {
        let trace = new_trace(None);
        tracing::info!(
            invocation_id = %trace.invocation_id,
            target = ?start.target.as_ref().map(|r| &r.id),
            trigger = ?start.trigger.as_ref().map(|r| &r.id),
            "invocation started"
        );
        trace
    }

    async fn trace_end(&self, trace: &InvocationTrace, error: Option<String>) {
        match &error {
            None => tracing::info!(invocation_id = %trace.invocation_id, "invocation completed"),
            Some(e) => tracing::warn!(
                invocation_id = %trace.invocation_id,
                error = %e,
                "invocation failed"
            ),
        }
    }
}

/// Records trace events in memory.
///
/// With a queue service attached, each invocation also gets its own trace
/// queue, which the dispatcher binds as the function's tracing sink.
#[derive(Default)]
pub struct InMemoryInvocationTracer {
    events: Mutex<Vec<InvocationTraceEvent>>,
    queues: Option<Arc<dyn QueueService>>,
}

impl InMemoryInvocationTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace_queues(queues: Arc<dyn QueueService>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            queues: Some(queues),
        }
    }

    pub fn events(&self) -> Vec<InvocationTraceEvent> {
        self.events.lock().clone()
    }

    pub fn spans(&self) -> Vec<InvocationSpan> {
        create_invocation_spans(&self.events.lock(), Utc::now().timestamp_millis())
    }
}

#[async_trait]
impl InvocationTracer for InMemoryInvocationTracer {
    async fn trace_start(&self, start: TraceStart) -> InvocationTrace {
        let trace_queue = match &self.queues {
            Some(queues) => match queues.create_queue().await {
                Ok(queue) => Some(queue),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to create trace queue");
                    None
                }
            },
            None => None,
        };
        let trace = new_trace(trace_queue);
        self.events.lock().push(InvocationTraceEvent::Start {
            invocation_id: trace.invocation_id.clone(),
            timestamp: Utc::now().timestamp_millis(),
            start,
            trace_queue: trace.trace_queue.clone(),
        });
        trace
    }

    async fn trace_end(&self, trace: &InvocationTrace, error: Option<String>) {
        self.events.lock().push(InvocationTraceEvent::End {
            invocation_id: trace.invocation_id.clone(),
            timestamp: Utc::now().timestamp_millis(),
            outcome: outcome(&error),
            error,
        });
    }
}
