//! Runtime context given to every function invocation.
//!
//! Handlers reach their declared capabilities exclusively through
//! [`FunctionCtx`]. The executor builds a fresh context per invocation with
//! only the services the function declared; reaching for anything else
//! fails with [`ServiceError::NotDeclared`].

use std::sync::Arc;

use serde_json::Value;

use crate::errors::{CredentialsError, HandlerError, ServiceError};
use crate::services::FunctionServices;
use crate::traits::{AiService, CredentialsProvider, Database, QueueService, TracingSink};
use crate::types::{ServiceKind, ServiceSet, SpaceKey};

/// Per-invocation context. Cheap to clone.
#[derive(Clone)]
pub struct FunctionCtx {
    invocation_id: String,
    function_key: String,
    space: Option<SpaceKey>,
    subject_id: Option<String>,
    trigger_id: Option<String>,
    declared: ServiceSet,
    services: FunctionServices,
}

impl FunctionCtx {
    pub(crate) fn new(
        function_key: String,
        declared: ServiceSet,
        services: FunctionServices,
    ) -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            function_key,
            space: None,
            subject_id: None,
            trigger_id: None,
            declared,
            services,
        }
    }

    pub(crate) fn with_bindings(
        mut self,
        space: Option<SpaceKey>,
        subject_id: Option<String>,
        trigger_id: Option<String>,
    ) -> Self {
        self.space = space;
        self.subject_id = subject_id;
        self.trigger_id = trigger_id;
        self
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn function_key(&self) -> &str {
        &self.function_key
    }

    pub fn space(&self) -> Option<&SpaceKey> {
        self.space.as_ref()
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.subject_id.as_deref()
    }

    pub fn trigger_id(&self) -> Option<&str> {
        self.trigger_id.as_deref()
    }

    fn declared(&self, kind: ServiceKind) -> Result<(), ServiceError> {
        if self.declared.contains(kind) {
            Ok(())
        } else {
            Err(ServiceError::NotDeclared { service: kind })
        }
    }

    fn resolve<T: ?Sized>(
        &self,
        kind: ServiceKind,
        service: &Option<Arc<T>>,
    ) -> Result<Arc<T>, ServiceError> {
        self.declared(kind)?;
        service
            .clone()
            .ok_or(ServiceError::NotAvailable { service: kind })
    }

    pub fn database(&self) -> Result<Arc<dyn Database>, ServiceError> {
        self.resolve(ServiceKind::Database, &self.services.database)
    }

    pub fn queues(&self) -> Result<Arc<dyn QueueService>, ServiceError> {
        self.resolve(ServiceKind::Queue, &self.services.queues)
    }

    pub fn credentials(&self) -> Result<Arc<dyn CredentialsProvider>, ServiceError> {
        self.resolve(ServiceKind::Credentials, &self.services.credentials)
    }

    pub fn ai(&self) -> Result<Arc<dyn AiService>, ServiceError> {
        self.resolve(ServiceKind::Ai, &self.services.ai)
    }

    pub fn tracing(&self) -> Result<Arc<dyn TracingSink>, ServiceError> {
        self.resolve(ServiceKind::Tracing, &self.services.tracing)
    }

    /// Look up a credential, failing if it is not configured.
    pub async fn credential(&self, service: &str) -> Result<String, HandlerError> {
        let provider = self.credentials()?;
        provider
            .get(service)
            .await?
            .ok_or_else(|| {
                CredentialsError::NotFound {
                    service: service.to_string(),
                }
                .into()
            })
    }

    /// Write a trace event if the function declared tracing. No-op otherwise.
    pub fn trace(&self, event: Value) {
        if let Ok(sink) = self.tracing() {
            sink.write(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::StaticCredentials;
    use crate::services::{InvocationContext, ServiceRegistry};

    fn ctx_with(declared: ServiceSet, registry: &ServiceRegistry) -> FunctionCtx {
        let services = registry
            .compose(&declared, &InvocationContext::new())
            .expect("compose");
        FunctionCtx::new("example.org/function/test".into(), declared, services)
    }

    #[test]
    fn test_undeclared_service_is_rejected() {
        let registry = ServiceRegistry::new();
        let ctx = ctx_with(ServiceSet::none(), &registry);
        match ctx.tracing() {
            Err(ServiceError::NotDeclared { service }) => assert_eq!(service, ServiceKind::Tracing),
            Ok(_) => panic!("expected NotDeclared, got a sink"),
            Err(other) => panic!("expected NotDeclared, got: {other}"),
        }
    }

    #[tokio::test]
    async fn test_credential_lookup() {
        let registry = ServiceRegistry::new()
            .with_credentials(Arc::new(StaticCredentials::new().with("example.com", "k1")));
        let ctx = ctx_with(ServiceSet::from([ServiceKind::Credentials]), &registry);

        assert_eq!(ctx.credential("example.com").await.expect("credential"), "k1");
        match ctx.credential("missing").await {
            Err(HandlerError::Credentials(CredentialsError::NotFound { service })) => {
                assert_eq!(service, "missing")
            }
            other => panic!("expected NotFound, got: {other:?}"),
        }
    }
}
