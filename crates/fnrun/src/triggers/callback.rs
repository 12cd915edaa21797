//! Callbacks connecting mounted triggers to function invocation.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::dispatcher::{InvokeTriggerOptions, TriggerDispatcher};
use crate::traits::TriggerCallback;
use crate::types::{ObjectRef, Trigger, TriggerEvent};

/// Routes events from a mount into [`TriggerDispatcher::invoke_trigger`].
///
/// The trigger is reloaded on every event so a disabled or removed trigger
/// never runs. A successful output object may carry a `status_code` used as
/// the webhook response code; failures answer 500.
pub struct DispatchCallback {
    dispatcher: Arc<TriggerDispatcher>,
    trigger_id: String,
}

impl DispatchCallback {
    pub fn new(dispatcher: Arc<TriggerDispatcher>, trigger: &Trigger) -> Self {
        Self {
            dispatcher,
            trigger_id: trigger.id.clone(),
        }
    }
}

#[async_trait]
impl TriggerCallback for DispatchCallback {
    async fn fire(&self, event: TriggerEvent) -> Option<u16> {
        let trigger = match self
            .dispatcher
            .load_trigger(&ObjectRef::new(self.trigger_id.clone()))
            .await
        {
            Ok(Some(trigger)) => trigger,
            Ok(None) => {
                tracing::warn!(trigger_id = %self.trigger_id, "trigger no longer exists");
                return Some(404);
            }
            Err(e) => {
                tracing::error!(trigger_id = %self.trigger_id, error = %e, "failed to load trigger");
                return Some(500);
            }
        };
        if !trigger.enabled {
            tracing::debug!(trigger_id = %trigger.id, "ignoring event for disabled trigger");
            return Some(404);
        }

        let result = self
            .dispatcher
            .invoke_trigger(InvokeTriggerOptions::new(trigger).event(event))
            .await;
        match result.result {
            Ok(output) => output
                .get("status_code")
                .and_then(Value::as_u64)
                .and_then(|code| u16::try_from(code).ok()),
            Err(_) => Some(500),
        }
    }
}

/// Callback backed by an async closure.
pub struct FnCallback<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

pub fn callback_fn<F, Fut>(f: F) -> FnCallback<F, Fut>
where
    F: Fn(TriggerEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<u16>> + Send + 'static,
{
    FnCallback {
        f,
        _fut: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> TriggerCallback for FnCallback<F, Fut>
where
    F: Fn(TriggerEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<u16>> + Send + 'static,
{
    async fn fire(&self, event: TriggerEvent) -> Option<u16> {
        (self.f)(event).await
    }
}
