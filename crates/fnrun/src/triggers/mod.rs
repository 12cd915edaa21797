//! Trigger system.
//!
//! Two ways of driving functions from triggers share one persisted
//! [`Trigger`](crate::types::Trigger) model. The [`TriggerRegistry`] observes
//! a space and mounts each trigger as a live activation (timer task, webhook
//! listener, websocket client, live query). The [`TriggerDispatcher`] polls
//! the persisted triggers instead and supports a manually advanced clock.
//! [`DispatchCallback`] connects the two, so live mounts invoke through the
//! dispatcher.

mod callback;
mod deferred;
mod dispatcher;
mod handlers;
mod input;
mod registry;
mod schedule;
mod scope;
mod tracer;

pub use callback::{callback_fn, DispatchCallback, FnCallback};
pub use dispatcher::{
    InvokeTriggerOptions, ScheduledTrigger, TriggerDispatcher, TriggerDispatcherBuilder,
    TriggerExecutionResult,
};
pub use handlers::{HandlerConfig, TriggerContext};
pub use registry::{RegistryEvent, RegistryManifest, TriggerRegistry};
pub use scope::{ActivationScope, MountStatus};
pub use tracer::{InMemoryInvocationTracer, LogInvocationTracer};
