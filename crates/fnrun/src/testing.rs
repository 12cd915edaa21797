//! Shared fixtures for tests of code built on this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::HandlerError;
use crate::executor::{handler_fn, FunctionInvocationService, LocalFunctionExecutor};
use crate::function_registry::FunctionRegistry;
use crate::services::ServiceRegistry;
use crate::traits::Database;
use crate::types::{FunctionDefinition, ObjectRef};

/// Returns its input unchanged.
pub fn echo_function(key: &str) -> FunctionDefinition {
    FunctionDefinition::new(key, "echo", handler_fn(Ok))
}

/// Echoes its input and counts invocations.
pub fn counting_function(key: &str) -> (FunctionDefinition, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let definition = FunctionDefinition::new(
        key,
        "count",
        handler_fn(move |input| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(input)
        }),
    );
    (definition, calls)
}

/// Always fails with a handler error.
pub fn failing_function(key: &str) -> FunctionDefinition {
    FunctionDefinition::new(key, "fail", handler_fn(|_| Err(HandlerError::failed("boom"))))
}

/// Local-only invocation service over `functions` with default services.
pub fn invocation_service(functions: FunctionRegistry) -> Arc<FunctionInvocationService> {
    Arc::new(FunctionInvocationService::new(
        Arc::new(functions),
        LocalFunctionExecutor::new(Arc::new(ServiceRegistry::new())),
    ))
}

/// Stores the persisted form of `definition` and returns its reference.
///
/// # Panics
///
/// If the database rejects the write.
pub async fn store_function(database: &dyn Database, definition: &FunctionDefinition) -> ObjectRef {
    let object = definition
        .serialize()
        .to_object()
        .expect("serializable function");
    database
        .add(object)
        .await
        .expect("function stored")
        .reference()
}

/// Routes `tracing` output through the test harness. Safe to call from
/// every test.
#[cfg(test)]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
