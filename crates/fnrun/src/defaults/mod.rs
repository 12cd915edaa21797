//! Default implementations of the collaborator traits.
//!
//! These let the runtime start with zero external configuration and back
//! the test suite. Each can be replaced via the runtime builder.

pub mod credentials;
pub mod in_memory_database;
pub mod in_memory_queue;
pub mod in_memory_trigger_state;
pub mod tracing_sink;

pub use credentials::{EnvCredentials, StaticCredentials};
pub use in_memory_database::InMemoryDatabase;
pub use in_memory_queue::InMemoryQueue;
pub use in_memory_trigger_state::InMemoryTriggerState;
pub use tracing_sink::{LogTracingSink, QueueTracingSink};
