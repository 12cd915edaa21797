//! fnrun: trigger scheduling, dispatch and invocation for serverless-style
//! functions.
//!
//! Functions are registered with a [`Runtime`] and bound to persisted
//! triggers (cron timers, webhooks, websockets, database subscriptions and
//! queues). Triggers are either mounted live by the [`TriggerRegistry`] or
//! polled by a [`TriggerDispatcher`]; both invoke through the
//! [`FunctionInvocationService`], which validates schemas, composes the
//! function's declared services and runs the handler in-process or forwards
//! to a deployed copy.
//!
//! Storage, queues, credentials and AI providers are collaborators reached
//! through the traits in [`traits`]; in-memory implementations live in
//! [`defaults`].

pub mod defaults;
pub mod errors;
pub mod executor;
pub mod function_ctx;
pub mod function_registry;
pub mod runtime;
pub mod services;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod triggers;
pub mod types;

// Re-export public types at the crate level.

// defaults
pub use defaults::{
    EnvCredentials, InMemoryDatabase, InMemoryQueue, InMemoryTriggerState, LogTracingSink,
    QueueTracingSink, StaticCredentials,
};

// errors
pub use errors::{
    AiError, CredentialsError, DatabaseError, DispatchError, FunctionError, HandlerError,
    InvocationError, QueueError, RuntimeError, ServiceError, StateError, TriggerError,
};

// executor
pub use executor::{
    async_handler_fn, handler_fn, FunctionInvocationService, LocalFunctionExecutor,
    RemoteFunctionClient,
};

// function_ctx
pub use function_ctx::FunctionCtx;

// function_registry
pub use function_registry::FunctionRegistry;

// runtime
pub use runtime::{
    DispatcherConfig, RemoteConfig, Runtime, RuntimeBuilder, SubscriptionConfig, TimeControl,
    WebsocketConfig,
};

// services
pub use services::{InvocationContext, ServiceRegistry};

// traits
pub use traits::{
    AiService, CredentialsProvider, Database, FunctionHandler, FunctionResolver,
    InvocationTracer, QueueService, RemoteFunctionCaller, TracingSink, TriggerCallback,
    TriggerStateStore,
};

// triggers
pub use triggers::{
    callback_fn, ActivationScope, DispatchCallback, InMemoryInvocationTracer,
    InvokeTriggerOptions, LogInvocationTracer, MountStatus, RegistryEvent, RegistryManifest,
    TriggerContext, TriggerDispatcher, TriggerExecutionResult, TriggerRegistry,
};

// types
pub use types::{
    DbObject, Filter, FunctionDefinition, ObjectRef, SerializedFunction, ServiceKind, ServiceSet,
    SpaceKey, Trigger, TriggerEvent, TriggerKind, TriggerSpec,
};
