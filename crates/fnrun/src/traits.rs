//! Pluggable seams: collaborators the runtime reaches through traits.
//!
//! In-memory implementations live in [`crate::defaults`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::errors::{
    AiError, CredentialsError, DatabaseError, HandlerError, InvocationError, QueueError,
    StateError,
};
use crate::function_ctx::FunctionCtx;
use crate::types::{
    DbObject, Filter, FunctionDefinition, InvocationTrace, ObjectRef, QuerySnapshot, QueueItem,
    TraceStart, TriggerEvent, TriggerState,
};

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Receiving end of a live query. The first snapshot carries the current
/// matching set with no changed ids; later snapshots list the ids written
/// since the previous one. Dropping it ends the subscription.
pub struct LiveQuery {
    pub rx: mpsc::Receiver<QuerySnapshot>,
}

/// Object store for one space.
#[async_trait]
pub trait Database: Send + Sync {
    async fn query(&self, filter: &Filter) -> Result<Vec<DbObject>, DatabaseError>;

    async fn load(&self, reference: &ObjectRef) -> Result<Option<DbObject>, DatabaseError>;

    /// Insert or replace an object. Returns the stored copy with its new
    /// version.
    async fn add(&self, object: DbObject) -> Result<DbObject, DatabaseError>;

    /// Returns whether an object was removed.
    async fn remove(&self, id: &str) -> Result<bool, DatabaseError>;

    async fn subscribe(&self, filter: &Filter) -> Result<LiveQuery, DatabaseError>;
}

// ---------------------------------------------------------------------------
// Queues
// ---------------------------------------------------------------------------

/// Append-only queues addressed by name.
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Create a new empty queue and return its name.
    async fn create_queue(&self) -> Result<String, QueueError>;

    /// Append items, returning their positions.
    async fn append(&self, queue: &str, items: Vec<Value>) -> Result<Vec<u64>, QueueError>;

    /// Items with a position strictly after `after`, oldest first.
    async fn query(
        &self,
        queue: &str,
        after: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<QueueItem>, QueueError>;
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Looks up credentials for external services by service name.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn get(&self, service: &str) -> Result<Option<String>, CredentialsError>;

    async fn list_services(&self) -> Result<Vec<String>, CredentialsError>;
}

// ---------------------------------------------------------------------------
// AI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub prompt: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    pub content: Value,
}

/// Model access offered to functions declaring the `ai` capability.
#[async_trait]
pub trait AiService: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: AiRequest) -> Result<AiResponse, AiError>;
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Sink for trace events written by functions. Writes never block the caller.
pub trait TracingSink: Send + Sync {
    fn write(&self, event: Value);
}

/// Records the start and end of each trigger invocation.
#[async_trait]
pub trait InvocationTracer: Send + Sync {
    async fn trace_start(&self, start: TraceStart) -> InvocationTrace;

    async fn trace_end(&self, trace: &InvocationTrace, error: Option<String>);
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// Body of a function. Sync and async closures are adapted with
/// [`handler_fn`](crate::executor::handler_fn) and
/// [`async_handler_fn`](crate::executor::async_handler_fn).
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn run(&self, ctx: &FunctionCtx, input: Value) -> Result<Value, HandlerError>;
}

/// Resolves in-process function definitions by stable key.
pub trait FunctionResolver: Send + Sync {
    fn resolve(&self, key: &str) -> Option<FunctionDefinition>;
}

/// Query parameters forwarded with a remote invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteCallOptions {
    pub space_id: Option<String>,
    pub subject_id: Option<String>,
}

/// Invokes a deployed function over the network.
#[async_trait]
pub trait RemoteFunctionCaller: Send + Sync {
    async fn call(
        &self,
        function_id: &str,
        input: Value,
        options: &RemoteCallOptions,
    ) -> Result<Value, InvocationError>;
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// Persists polled trigger progress (queue cursors, processed versions).
#[async_trait]
pub trait TriggerStateStore: Send + Sync {
    async fn get_state(&self, trigger_id: &str) -> Result<Option<TriggerState>, StateError>;

    async fn save_state(&self, state: TriggerState) -> Result<(), StateError>;
}

/// Receives events from a mounted trigger. The returned status is used by
/// webhook mounts as the HTTP response code (`None` means 200).
#[async_trait]
pub trait TriggerCallback: Send + Sync {
    async fn fire(&self, event: TriggerEvent) -> Option<u16>;
}
