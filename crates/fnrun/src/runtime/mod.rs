//! Runtime assembly: functions, the trigger registry and per-space
//! dispatchers behind one handle.

mod builder;
mod config;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

pub use builder::RuntimeBuilder;
pub use config::{DispatcherConfig, RemoteConfig, SubscriptionConfig, TimeControl, WebsocketConfig};

use crate::errors::{InvocationError, RuntimeError, TriggerError};
use crate::executor::FunctionInvocationService;
use crate::function_registry::FunctionRegistry;
use crate::services::InvocationContext;
use crate::traits::{Database, FunctionResolver, InvocationTracer, QueueService, TriggerStateStore};
use crate::triggers::{
    DispatchCallback, RegistryManifest, TriggerContext, TriggerDispatcher, TriggerRegistry,
};
use crate::types::{SpaceKey, Trigger, TriggerKind};

struct OpenSpace {
    database: Arc<dyn Database>,
    dispatcher: Arc<TriggerDispatcher>,
}

pub struct Runtime {
    functions: FunctionRegistry,
    invocation: Arc<FunctionInvocationService>,
    triggers: Arc<TriggerRegistry>,
    tracer: Arc<dyn InvocationTracer>,
    state: Arc<dyn TriggerStateStore>,
    queues: Option<Arc<dyn QueueService>>,
    dispatcher_config: DispatcherConfig,
    spaces: Mutex<HashMap<SpaceKey, OpenSpace>>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn invocation(&self) -> &Arc<FunctionInvocationService> {
        &self.invocation
    }

    pub fn triggers(&self) -> &Arc<TriggerRegistry> {
        &self.triggers
    }

    /// The registered functions in persisted form.
    pub fn manifest(&self) -> RegistryManifest {
        RegistryManifest {
            functions: self
                .functions
                .definitions()
                .iter()
                .map(|definition| definition.serialize())
                .collect(),
            triggers: Vec::new(),
        }
    }

    /// Invokes a registered function in-process by key.
    pub async fn invoke(
        &self,
        key: &str,
        input: Value,
        ctx: &InvocationContext,
    ) -> Result<Value, InvocationError> {
        let definition = self
            .functions
            .resolve(key)
            .ok_or_else(|| InvocationError::NotResolved {
                key: key.to_string(),
            })?;
        self.invocation.invoke_definition(&definition, input, ctx).await
    }

    /// Opens a space: stores the registered functions and `triggers` in
    /// `database`, starts observing its triggers and returns its dispatcher.
    /// Reopening returns the existing dispatcher.
    pub async fn open_space(
        &self,
        space: SpaceKey,
        database: Arc<dyn Database>,
        triggers: Vec<Trigger>,
    ) -> Result<Arc<TriggerDispatcher>, RuntimeError> {
        self.triggers
            .open_space(space.clone(), Arc::clone(&database))
            .await?;
        let mut manifest = self.manifest();
        manifest.triggers = triggers;
        self.triggers.register(&space, manifest).await?;

        let mut spaces = self.spaces.lock();
        let open = spaces.entry(space.clone()).or_insert_with(|| {
            let mut builder = TriggerDispatcher::builder(Arc::clone(&database), Arc::clone(&self.invocation))
                .config(self.dispatcher_config.clone())
                .space(space)
                .tracer(Arc::clone(&self.tracer))
                .state_store(Arc::clone(&self.state));
            if let Some(queues) = &self.queues {
                builder = builder.queues(Arc::clone(queues));
            }
            OpenSpace {
                database,
                dispatcher: builder.build(),
            }
        });
        Ok(Arc::clone(&open.dispatcher))
    }

    pub fn dispatcher(&self, space: &SpaceKey) -> Option<Arc<TriggerDispatcher>> {
        self.spaces
            .lock()
            .get(space)
            .map(|open| Arc::clone(&open.dispatcher))
    }

    /// Mounts every inactive, enabled trigger of `space` whose kind the
    /// space's dispatcher does not poll, routing events through that
    /// dispatcher. Queue triggers are never mounted. Individual mount
    /// failures are logged; returns how many mounted.
    pub async fn activate_all(&self, space: &SpaceKey) -> Result<usize, RuntimeError> {
        let (database, dispatcher) = {
            let spaces = self.spaces.lock();
            let open = spaces.get(space).ok_or_else(|| TriggerError::SpaceNotOpen {
                space: space.to_string(),
            })?;
            (Arc::clone(&open.database), Arc::clone(&open.dispatcher))
        };
        let ctx = TriggerContext::new(space.clone(), database);

        let mut activated = 0;
        for trigger in self.triggers.get_inactive_triggers(space) {
            let kind = trigger.kind();
            if !trigger.enabled || kind == TriggerKind::Queue || dispatcher.polls(kind) {
                continue;
            }
            let callback = Arc::new(DispatchCallback::new(Arc::clone(&dispatcher), &trigger));
            match self.triggers.activate(&ctx, &trigger, callback).await {
                Ok(()) => activated += 1,
                Err(e) => {
                    tracing::warn!(space = %space, trigger_id = %trigger.id, error = %e, "skipping trigger");
                }
            }
        }
        Ok(activated)
    }

    /// Stops every dispatcher and disposes every activation.
    pub async fn shutdown(&self) {
        let spaces: Vec<OpenSpace> = self.spaces.lock().drain().map(|(_, open)| open).collect();
        for open in spaces {
            open.dispatcher.stop().await;
        }
        self.triggers.close().await;
        tracing::info!("runtime shut down");
    }
}
