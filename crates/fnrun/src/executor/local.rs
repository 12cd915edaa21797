//! In-process function execution.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde_json::Value;
use tracing::Instrument;

use super::schema;
use crate::errors::{FunctionError, HandlerError, ServiceError};
use crate::function_ctx::FunctionCtx;
use crate::services::{InvocationContext, ServiceRegistry};
use crate::types::FunctionDefinition;

/// Validates, composes services for and runs one function definition.
#[derive(Debug, Clone)]
pub struct LocalFunctionExecutor {
    services: Arc<ServiceRegistry>,
}

impl LocalFunctionExecutor {
    pub fn new(services: Arc<ServiceRegistry>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Run `definition` with `input`.
    ///
    /// Input is validated before the handler runs; the handler never sees
    /// invalid input. Handler errors and panics surface as
    /// [`FunctionError::Execution`].
    pub async fn invoke_function(
        &self,
        definition: &FunctionDefinition,
        input: Value,
        ctx: &InvocationContext,
    ) -> Result<Value, FunctionError> {
        let span = tracing::info_span!(
            "function_invocation",
            function = %definition.name,
            key = %definition.key,
        );
        self.execute(definition, input, ctx).instrument(span).await
    }

    async fn execute(
        &self,
        definition: &FunctionDefinition,
        input: Value,
        ctx: &InvocationContext,
    ) -> Result<Value, FunctionError> {
        let function = definition.name.clone();

        schema::validate(definition.input_schema.as_ref(), &input).map_err(|message| {
            tracing::warn!(error = %message, "rejected function input");
            FunctionError::InvalidInput {
                function: function.clone(),
                message,
            }
        })?;

        let services = self
            .services
            .compose(&definition.services, ctx)
            .map_err(|e| match e {
                ServiceError::NotAvailable { service } | ServiceError::NotDeclared { service } => {
                    FunctionError::ServiceNotAvailable {
                        function: function.clone(),
                        service,
                    }
                }
            })?;

        let fn_ctx = FunctionCtx::new(definition.key.clone(), definition.services.clone(), services)
            .with_bindings(
                ctx.space.clone(),
                ctx.subject_id.clone(),
                ctx.trigger_id.clone(),
            );

        let started = Instant::now();
        let outcome = AssertUnwindSafe(definition.handler.run(&fn_ctx, input))
            .catch_unwind()
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(cause)) => {
                tracing::warn!(duration_ms, error = %cause, "function failed");
                return Err(FunctionError::Execution { function, cause });
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(duration_ms, error = %message, "function panicked");
                return Err(FunctionError::Execution {
                    function,
                    cause: HandlerError::Panicked { message },
                });
            }
        };

        schema::validate(definition.output_schema.as_ref(), &output).map_err(|message| {
            tracing::warn!(error = %message, "rejected function output");
            FunctionError::InvalidOutput {
                function: function.clone(),
                message,
            }
        })?;

        tracing::debug!(duration_ms, "function completed");
        Ok(output)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::executor::{async_handler_fn, handler_fn};
    use crate::traits::QueueService;
    use crate::types::ServiceKind;

    fn executor() -> LocalFunctionExecutor {
        LocalFunctionExecutor::new(Arc::new(ServiceRegistry::new()))
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let echo = FunctionDefinition::new("example.org/function/echo", "echo", handler_fn(Ok));
        let output = executor()
            .invoke_function(&echo, json!({"message": "hello"}), &InvocationContext::new())
            .await
            .expect("invoke");
        assert_eq!(output, json!({"message": "hello"}));
    }

    #[tokio::test]
    async fn test_invalid_input_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let def = FunctionDefinition::new(
            "example.org/function/sum",
            "sum",
            handler_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!(0))
            }),
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "iterations": {"type": "array", "items": {"type": "integer"}}
            },
        }));

        let result = executor()
            .invoke_function(&def, json!({"iterations": "invalid"}), &InvocationContext::new())
            .await;
        match result {
            Err(FunctionError::InvalidInput { function, .. }) => assert_eq!(function, "sum"),
            other => panic!("expected InvalidInput, got: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_output() {
        let def = FunctionDefinition::new(
            "example.org/function/bad",
            "bad",
            handler_fn(|_| Ok(json!("not a number"))),
        )
        .with_output_schema(json!({"type": "number"}));

        match executor()
            .invoke_function(&def, json!({}), &InvocationContext::new())
            .await
        {
            Err(FunctionError::InvalidOutput { .. }) => {}
            other => panic!("expected InvalidOutput, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handler_error_and_panic_are_execution_errors() {
        let failing = FunctionDefinition::new(
            "example.org/function/fail",
            "fail",
            handler_fn(|_| Err(HandlerError::failed("boom"))),
        );
        match executor()
            .invoke_function(&failing, json!({}), &InvocationContext::new())
            .await
        {
            Err(FunctionError::Execution { cause, .. }) => assert_eq!(cause.to_string(), "boom"),
            other => panic!("expected Execution, got: {other:?}"),
        }

        let panicking = FunctionDefinition::new(
            "example.org/function/panic",
            "panic",
            handler_fn(|_| panic!("handler exploded")),
        );
        match executor()
            .invoke_function(&panicking, json!({}), &InvocationContext::new())
            .await
        {
            Err(FunctionError::Execution {
                cause: HandlerError::Panicked { message },
                ..
            }) => assert_eq!(message, "handler exploded"),
            other => panic!("expected panic Execution, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unavailable_service_fails_before_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let def = FunctionDefinition::new(
            "example.org/function/ai",
            "ai",
            async_handler_fn(move |_ctx, input| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(input)
                }
            }),
        )
        .with_services([ServiceKind::Ai]);

        match executor()
            .invoke_function(&def, json!({}), &InvocationContext::new())
            .await
        {
            Err(FunctionError::ServiceNotAvailable { service, .. }) => {
                assert_eq!(service, ServiceKind::Ai)
            }
            other => panic!("expected ServiceNotAvailable, got: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_async_handler_uses_declared_queue() {
        let queues = Arc::new(crate::defaults::InMemoryQueue::new());
        let executor = LocalFunctionExecutor::new(Arc::new(
            ServiceRegistry::new().with_queues(queues.clone()),
        ));
        let def = FunctionDefinition::new(
            "example.org/function/enqueue",
            "enqueue",
            async_handler_fn(|ctx: FunctionCtx, input: Value| async move {
                let positions = ctx.queues()?.append("out", vec![input]).await?;
                Ok::<_, HandlerError>(json!({"position": positions[0]}))
            }),
        )
        .with_services([ServiceKind::Queue]);

        let output = executor
            .invoke_function(&def, json!({"n": 1}), &InvocationContext::new())
            .await
            .expect("invoke");
        assert_eq!(output, json!({"position": 1}));

        let items = queues.query("out", None, None).await.expect("query");
        assert_eq!(items[0].object, json!({"n": 1}));
    }
}
