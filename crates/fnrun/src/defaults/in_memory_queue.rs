//! In-memory append-only queues.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::errors::QueueError;
use crate::traits::QueueService;
use crate::types::QueueItem;

/// In-memory [`QueueService`]. Appending to an unknown queue creates it.
/// Positions are per queue, starting at 1.
pub struct InMemoryQueue {
    queues: RwLock<HashMap<String, Vec<QueueItem>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueService for InMemoryQueue {
    async fn create_queue(&self) -> Result<String, QueueError> {
        let name = uuid::Uuid::new_v4().to_string();
        self.queues.write().await.insert(name.clone(), Vec::new());
        Ok(name)
    }

    async fn append(&self, queue: &str, items: Vec<Value>) -> Result<Vec<u64>, QueueError> {
        let mut queues = self.queues.write().await;
        let entries = queues.entry(queue.to_string()).or_default();
        let mut positions = Vec::with_capacity(items.len());
        for object in items {
            let position = entries.last().map(|item| item.position).unwrap_or(0) + 1;
            entries.push(QueueItem { position, object });
            positions.push(position);
        }
        Ok(positions)
    }

    async fn query(
        &self,
        queue: &str,
        after: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<QueueItem>, QueueError> {
        let queues = self.queues.read().await;
        let entries = queues.get(queue).ok_or_else(|| QueueError::NotFound {
            queue: queue.to_string(),
        })?;
        let after = after.unwrap_or(0);
        Ok(entries
            .iter()
            .filter(|item| item.position > after)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}
