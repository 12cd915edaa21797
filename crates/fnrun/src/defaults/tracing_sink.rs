//! Tracing sinks for events written by functions.

use std::sync::Arc;

use serde_json::Value;

use crate::traits::{QueueService, TracingSink};

/// Emits function trace events as `tracing` events.
pub struct LogTracingSink;

impl TracingSink for LogTracingSink {
    fn write(&self, event: Value) {
        tracing::info!(event = %event, "function trace event");
    }
}

/// Appends function trace events to a queue, typically the per-invocation
/// trace queue allocated by the invocation tracer.
///
/// Appends run in the background; failures are logged and dropped.
pub struct QueueTracingSink {
    queues: Arc<dyn QueueService>,
    queue: String,
}

impl QueueTracingSink {
    pub fn new(queues: Arc<dyn QueueService>, queue: impl Into<String>) -> Self {
        Self {
            queues,
            queue: queue.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl TracingSink for QueueTracingSink {
    fn write(&self, event: Value) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(queue = %self.queue, "no runtime available, dropping trace event");
            return;
        };
        let queues = Arc::clone(&self.queues);
        let queue = self.queue.clone();
        runtime.spawn(async move {
            if let Err(e) = queues.append(&queue, vec![event]).await {
                tracing::warn!(queue = %queue, error = %e, "failed to append trace event");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::InMemoryQueue;
    use serde_json::json;

    #[tokio::test]
    async fn test_queue_sink_appends_in_background() {
        let queues = Arc::new(InMemoryQueue::new());
        let name = queues.create_queue().await.expect("create");
        let sink = QueueTracingSink::new(queues.clone(), name.clone());

        sink.write(json!({"step": 1}));

        let mut items = Vec::new();
        for _ in 0..50 {
            items = queues.query(&name, None, None).await.expect("query");
            if !items.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].object, json!({"step": 1}));
    }

    #[test]
    fn test_queue_sink_without_runtime_drops_event() {
        let sink = QueueTracingSink::new(Arc::new(InMemoryQueue::new()), "q");
        sink.write(json!({"step": 1}));
        assert_eq!(sink.queue(), "q");
    }
}
