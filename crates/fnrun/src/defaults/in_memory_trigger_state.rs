//! In-memory store for polled trigger progress.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::StateError;
use crate::traits::TriggerStateStore;
use crate::types::TriggerState;

/// [`TriggerStateStore`] backed by a `HashMap` keyed by trigger id.
pub struct InMemoryTriggerState {
    states: RwLock<HashMap<String, TriggerState>>,
}

impl InMemoryTriggerState {
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTriggerState {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TriggerStateStore for InMemoryTriggerState {
    async fn get_state(&self, trigger_id: &str) -> Result<Option<TriggerState>, StateError> {
        Ok(self.states.read().await.get(trigger_id).cloned())
    }

    async fn save_state(&self, state: TriggerState) -> Result<(), StateError> {
        self.states
            .write()
            .await
            .insert(state.trigger_id.clone(), state);
        Ok(())
    }
}
