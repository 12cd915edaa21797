//! Per-kind trigger mounts.
//!
//! Each handler acquires its live resources inside an [`ActivationScope`],
//! returns once the mount is ready and leaves cleanup to the scope.

mod subscription;
mod timer;
mod webhook;
mod websocket;

use std::sync::Arc;

use super::scope::ActivationScope;
use crate::errors::TriggerError;
use crate::runtime::{SubscriptionConfig, WebsocketConfig};
use crate::traits::{Database, TriggerCallback};
use crate::types::{SpaceKey, Trigger, TriggerKind, TriggerSpec};

/// The space a trigger is mounted in.
#[derive(Clone)]
pub struct TriggerContext {
    pub space: SpaceKey,
    pub database: Arc<dyn Database>,
}

impl TriggerContext {
    pub fn new(space: SpaceKey, database: Arc<dyn Database>) -> Self {
        Self { space, database }
    }
}

/// Tunables for mounts.
#[derive(Debug, Clone, Default)]
pub struct HandlerConfig {
    pub websocket: WebsocketConfig,
    pub subscription: SubscriptionConfig,
}

pub(crate) async fn mount_trigger(
    scope: &mut ActivationScope,
    ctx: &TriggerContext,
    trigger: &Trigger,
    callback: Arc<dyn TriggerCallback>,
    config: &HandlerConfig,
) -> Result<(), TriggerError> {
    match &trigger.spec {
        TriggerSpec::Timer(spec) => timer::mount(scope, trigger, spec, callback).await,
        TriggerSpec::Webhook(spec) => webhook::mount(scope, ctx, trigger, spec, callback).await,
        TriggerSpec::Websocket(spec) => {
            websocket::mount(scope, trigger, spec, callback, &config.websocket).await
        }
        TriggerSpec::Subscription(spec) => {
            subscription::mount(scope, ctx, trigger, spec, callback, &config.subscription).await
        }
        TriggerSpec::Queue(_) => Err(TriggerError::Unsupported {
            kind: TriggerKind::Queue,
        }),
    }
}
