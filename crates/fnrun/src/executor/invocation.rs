//! Routing between in-process and deployed function execution.

use std::sync::Arc;

use serde_json::Value;

use super::local::LocalFunctionExecutor;
use crate::errors::InvocationError;
use crate::services::InvocationContext;
use crate::traits::{FunctionResolver, RemoteCallOptions, RemoteFunctionCaller};
use crate::types::{FunctionDefinition, SerializedFunction};

/// Invokes stored functions locally by key or remotely by deployment id.
pub struct FunctionInvocationService {
    resolver: Arc<dyn FunctionResolver>,
    local: LocalFunctionExecutor,
    remote: Option<Arc<dyn RemoteFunctionCaller>>,
}

impl FunctionInvocationService {
    pub fn new(resolver: Arc<dyn FunctionResolver>, local: LocalFunctionExecutor) -> Self {
        Self {
            resolver,
            local,
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteFunctionCaller>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn local(&self) -> &LocalFunctionExecutor {
        &self.local
    }

    /// Invoke `function`. With a `deployed_function_id` the call goes to the
    /// remote caller; otherwise the definition is resolved by key and run
    /// in-process.
    pub async fn invoke_function(
        &self,
        function: &SerializedFunction,
        input: Value,
        deployed_function_id: Option<&str>,
        ctx: &InvocationContext,
    ) -> Result<Value, InvocationError> {
        if let Some(function_id) = deployed_function_id {
            let remote = self
                .remote
                .as_ref()
                .ok_or_else(|| InvocationError::RemoteUnavailable {
                    function_id: function_id.to_string(),
                })?;
            let options = RemoteCallOptions {
                space_id: ctx.space.as_ref().map(|space| space.to_string()),
                subject_id: ctx.subject_id.clone(),
            };
            return remote.call(function_id, input, &options).await;
        }

        let definition = self.resolver.resolve(&function.key).ok_or_else(|| {
            tracing::warn!(key = %function.key, "function not resolved");
            InvocationError::NotResolved {
                key: function.key.clone(),
            }
        })?;
        self.invoke_definition(&definition, input, ctx).await
    }

    /// Run a definition in-process.
    pub async fn invoke_definition(
        &self,
        definition: &FunctionDefinition,
        input: Value,
        ctx: &InvocationContext,
    ) -> Result<Value, InvocationError> {
        Ok(self.local.invoke_function(definition, input, ctx).await?)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::executor::handler_fn;
    use crate::function_registry::FunctionRegistry;
    use crate::services::ServiceRegistry;
    use crate::types::SpaceKey;

    #[derive(Default)]
    struct RecordingRemote {
        calls: Mutex<Vec<(String, Value, RemoteCallOptions)>>,
    }

    #[async_trait]
    impl RemoteFunctionCaller for RecordingRemote {
        async fn call(
            &self,
            function_id: &str,
            input: Value,
            options: &RemoteCallOptions,
        ) -> Result<Value, InvocationError> {
            self.calls
                .lock()
                .push((function_id.to_string(), input, options.clone()));
            Ok(json!({"remote": true}))
        }
    }

    fn service(registry: FunctionRegistry) -> FunctionInvocationService {
        FunctionInvocationService::new(
            Arc::new(registry),
            LocalFunctionExecutor::new(Arc::new(ServiceRegistry::new())),
        )
    }

    #[tokio::test]
    async fn test_local_resolution_by_key() {
        let registry = FunctionRegistry::new();
        let echo = FunctionDefinition::new("example.org/function/echo", "echo", handler_fn(Ok));
        let serialized = echo.serialize();
        registry.register(echo);

        let output = service(registry)
            .invoke_function(&serialized, json!({"n": 1}), None, &InvocationContext::new())
            .await
            .expect("invoke");
        assert_eq!(output, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_unresolved_key() {
        let serialized =
            FunctionDefinition::new("example.org/function/gone", "gone", handler_fn(Ok)).serialize();
        match service(FunctionRegistry::new())
            .invoke_function(&serialized, json!({}), None, &InvocationContext::new())
            .await
        {
            Err(InvocationError::NotResolved { key }) => {
                assert_eq!(key, "example.org/function/gone")
            }
            other => panic!("expected NotResolved, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deployed_function_goes_remote() {
        let remote = Arc::new(RecordingRemote::default());
        let service = service(FunctionRegistry::new()).with_remote(remote.clone());
        let serialized = FunctionDefinition::new("example.org/function/x", "x", handler_fn(Ok))
            .serialize()
            .with_deployment("dep-1");
        let ctx = InvocationContext::new()
            .with_space(
                SpaceKey::new("space-1"),
                Arc::new(crate::defaults::InMemoryDatabase::new()),
            )
            .with_subject("obj-1");

        let output = service
            .invoke_function(
                &serialized,
                json!({"n": 1}),
                serialized.deployment_id.as_deref(),
                &ctx,
            )
            .await
            .expect("invoke");
        assert_eq!(output, json!({"remote": true}));

        let calls = remote.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "dep-1");
        assert_eq!(calls[0].2.space_id.as_deref(), Some("space-1"));
        assert_eq!(calls[0].2.subject_id.as_deref(), Some("obj-1"));
    }

    #[tokio::test]
    async fn test_deployed_function_without_remote_caller() {
        match service(FunctionRegistry::new())
            .invoke_function(
                &FunctionDefinition::new("k", "k", handler_fn(Ok)).serialize(),
                json!({}),
                Some("dep-1"),
                &InvocationContext::new(),
            )
            .await
        {
            Err(InvocationError::RemoteUnavailable { function_id }) => {
                assert_eq!(function_id, "dep-1")
            }
            other => panic!("expected RemoteUnavailable, got: {other:?}"),
        }
    }
}
