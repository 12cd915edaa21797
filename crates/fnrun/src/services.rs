//! Capability composition.
//!
//! A [`ServiceRegistry`] holds the backends the runtime offers. At invocation
//! time [`ServiceRegistry::compose`] resolves exactly the capabilities a
//! function declared, binding the space database from the
//! [`InvocationContext`]. A required capability without a backend fails with
//! [`ServiceError::NotAvailable`] before the handler runs.

use std::fmt;
use std::sync::Arc;

use crate::defaults::LogTracingSink;
use crate::errors::ServiceError;
use crate::traits::{AiService, CredentialsProvider, Database, QueueService, TracingSink};
use crate::types::{ServiceKind, ServiceSet, SpaceKey};

/// Backends available to all functions run by one runtime.
#[derive(Clone)]
pub struct ServiceRegistry {
    queues: Option<Arc<dyn QueueService>>,
    credentials: Option<Arc<dyn CredentialsProvider>>,
    ai: Option<Arc<dyn AiService>>,
    tracing: Option<Arc<dyn TracingSink>>,
}

impl ServiceRegistry {
    /// Registry with only the logging tracing sink.
    pub fn new() -> Self {
        Self {
            queues: None,
            credentials: None,
            ai: None,
            tracing: Some(Arc::new(LogTracingSink)),
        }
    }

    /// Registry with no backends at all.
    pub fn empty() -> Self {
        Self {
            queues: None,
            credentials: None,
            ai: None,
            tracing: None,
        }
    }

    pub fn with_queues(mut self, queues: Arc<dyn QueueService>) -> Self {
        self.queues = Some(queues);
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_ai(mut self, ai: Arc<dyn AiService>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn with_tracing(mut self, tracing: Arc<dyn TracingSink>) -> Self {
        self.tracing = Some(tracing);
        self
    }

    pub fn queues(&self) -> Option<&Arc<dyn QueueService>> {
        self.queues.as_ref()
    }

    /// Whether a backend exists for `kind` given the invocation context.
    pub fn is_available(&self, kind: ServiceKind, ctx: &InvocationContext) -> bool {
        match kind {
            ServiceKind::Database => ctx.database.is_some(),
            ServiceKind::Queue => self.queues.is_some(),
            ServiceKind::Credentials => self.credentials.is_some(),
            ServiceKind::Ai => self.ai.is_some(),
            ServiceKind::Tracing => ctx.tracing.is_some() || self.tracing.is_some(),
        }
    }

    /// Resolve exactly the `required` capabilities.
    pub fn compose(
        &self,
        required: &ServiceSet,
        ctx: &InvocationContext,
    ) -> Result<FunctionServices, ServiceError> {
        let mut services = FunctionServices::default();
        for kind in required.iter() {
            match kind {
                ServiceKind::Database => services.database = ctx.database.clone(),
                ServiceKind::Queue => services.queues = self.queues.clone(),
                ServiceKind::Credentials => services.credentials = self.credentials.clone(),
                ServiceKind::Ai => services.ai = self.ai.clone(),
                ServiceKind::Tracing => {
                    services.tracing = ctx.tracing.clone().or_else(|| self.tracing.clone())
                }
            }
            if !services.has(kind) {
                return Err(ServiceError::NotAvailable { service: kind });
            }
        }
        Ok(services)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("queues", &self.queues.is_some())
            .field("credentials", &self.credentials.is_some())
            .field("ai", &self.ai.is_some())
            .field("tracing", &self.tracing.is_some())
            .finish()
    }
}

/// The subset of backends composed for one invocation.
#[derive(Clone, Default)]
pub struct FunctionServices {
    pub(crate) database: Option<Arc<dyn Database>>,
    pub(crate) queues: Option<Arc<dyn QueueService>>,
    pub(crate) credentials: Option<Arc<dyn CredentialsProvider>>,
    pub(crate) ai: Option<Arc<dyn AiService>>,
    pub(crate) tracing: Option<Arc<dyn TracingSink>>,
}

impl FunctionServices {
    pub fn has(&self, kind: ServiceKind) -> bool {
        match kind {
            ServiceKind::Database => self.database.is_some(),
            ServiceKind::Queue => self.queues.is_some(),
            ServiceKind::Credentials => self.credentials.is_some(),
            ServiceKind::Ai => self.ai.is_some(),
            ServiceKind::Tracing => self.tracing.is_some(),
        }
    }
}

/// Per-invocation bindings: the space the invocation runs against and its
/// database, the subject being processed, and an optional tracing override.
#[derive(Clone, Default)]
pub struct InvocationContext {
    pub space: Option<SpaceKey>,
    pub database: Option<Arc<dyn Database>>,
    pub subject_id: Option<String>,
    pub trigger_id: Option<String>,
    pub tracing: Option<Arc<dyn TracingSink>>,
}

impl InvocationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_space(mut self, space: SpaceKey, database: Arc<dyn Database>) -> Self {
        self.space = Some(space);
        self.database = Some(database);
        self
    }

    pub fn with_database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn with_trigger(mut self, trigger_id: impl Into<String>) -> Self {
        self.trigger_id = Some(trigger_id.into());
        self
    }

    pub fn with_tracing(mut self, tracing: Arc<dyn TracingSink>) -> Self {
        self.tracing = Some(tracing);
        self
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("space", &self.space)
            .field("database", &self.database.is_some())
            .field("subject_id", &self.subject_id)
            .field("trigger_id", &self.trigger_id)
            .finish_non_exhaustive()
    }
}
