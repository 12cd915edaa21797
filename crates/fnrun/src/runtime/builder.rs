//! Runtime builder: assembles functions, collaborators and configuration.

use std::sync::Arc;

use super::config::{DispatcherConfig, RemoteConfig, SubscriptionConfig, WebsocketConfig};
use super::Runtime;
use crate::defaults::InMemoryTriggerState;
use crate::errors::RuntimeError;
use crate::executor::{FunctionInvocationService, LocalFunctionExecutor, RemoteFunctionClient};
use crate::function_registry::FunctionRegistry;
use crate::services::ServiceRegistry;
use crate::traits::{
    AiService, CredentialsProvider, FunctionResolver, InvocationTracer, QueueService,
    RemoteFunctionCaller, TracingSink, TriggerStateStore,
};
use crate::triggers::{HandlerConfig, LogInvocationTracer, TriggerRegistry};
use crate::types::FunctionDefinition;

/// Builder for assembling the [`Runtime`].
///
/// Every collaborator is optional. Without a remote endpoint, deployed
/// functions fail with `RemoteUnavailable`; without a queue service,
/// queue triggers and the queue capability are unavailable.
pub struct RuntimeBuilder {
    functions: Vec<FunctionDefinition>,
    queues: Option<Arc<dyn QueueService>>,
    credentials: Option<Arc<dyn CredentialsProvider>>,
    ai: Option<Arc<dyn AiService>>,
    tracing_sink: Option<Arc<dyn TracingSink>>,
    tracer: Option<Arc<dyn InvocationTracer>>,
    state: Option<Arc<dyn TriggerStateStore>>,
    remote: Option<RemoteConfig>,
    remote_caller: Option<Arc<dyn RemoteFunctionCaller>>,
    dispatcher_config: DispatcherConfig,
    websocket_config: WebsocketConfig,
    subscription_config: SubscriptionConfig,
}

impl RuntimeBuilder {
    pub(crate) fn new() -> Self {
        Self {
            functions: Vec::new(),
            queues: None,
            credentials: None,
            ai: None,
            tracing_sink: None,
            tracer: None,
            state: None,
            remote: None,
            remote_caller: None,
            dispatcher_config: DispatcherConfig::default(),
            websocket_config: WebsocketConfig::default(),
            subscription_config: SubscriptionConfig::default(),
        }
    }

    pub fn function(mut self, definition: FunctionDefinition) -> Self {
        self.functions.push(definition);
        self
    }

    pub fn functions(mut self, definitions: impl IntoIterator<Item = FunctionDefinition>) -> Self {
        self.functions.extend(definitions);
        self
    }

    pub fn queues(mut self, queues: impl QueueService + 'static) -> Self {
        self.queues = Some(Arc::new(queues));
        self
    }

    pub fn credentials(mut self, credentials: impl CredentialsProvider + 'static) -> Self {
        self.credentials = Some(Arc::new(credentials));
        self
    }

    pub fn ai(mut self, ai: impl AiService + 'static) -> Self {
        self.ai = Some(Arc::new(ai));
        self
    }

    /// Default sink for events functions write through their tracing
    /// capability.
    pub fn tracing_sink(mut self, sink: impl TracingSink + 'static) -> Self {
        self.tracing_sink = Some(Arc::new(sink));
        self
    }

    pub fn tracer(mut self, tracer: Arc<dyn InvocationTracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn state_store(mut self, state: impl TriggerStateStore + 'static) -> Self {
        self.state = Some(Arc::new(state));
        self
    }

    /// Route deployed functions to an HTTP endpoint.
    pub fn remote(mut self, config: RemoteConfig) -> Self {
        self.remote = Some(config);
        self
    }

    /// Route deployed functions to a custom caller. Takes precedence over
    /// [`remote`](Self::remote).
    pub fn remote_caller(mut self, caller: Arc<dyn RemoteFunctionCaller>) -> Self {
        self.remote_caller = Some(caller);
        self
    }

    pub fn dispatcher_config(mut self, config: DispatcherConfig) -> Self {
        self.dispatcher_config = config;
        self
    }

    pub fn websocket_config(mut self, config: WebsocketConfig) -> Self {
        self.websocket_config = config;
        self
    }

    pub fn subscription_config(mut self, config: SubscriptionConfig) -> Self {
        self.subscription_config = config;
        self
    }

    pub fn build(self) -> Result<Runtime, RuntimeError> {
        let registry = FunctionRegistry::new();
        for definition in self.functions {
            if registry.resolve(&definition.key).is_some() {
                return Err(RuntimeError::Config {
                    message: format!("duplicate function key: {}", definition.key),
                });
            }
            registry.register(definition);
        }

        let mut services = ServiceRegistry::new();
        if let Some(queues) = &self.queues {
            services = services.with_queues(Arc::clone(queues));
        }
        if let Some(credentials) = self.credentials {
            services = services.with_credentials(credentials);
        }
        if let Some(ai) = self.ai {
            services = services.with_ai(ai);
        }
        if let Some(sink) = self.tracing_sink {
            services = services.with_tracing(sink);
        }

        let local = LocalFunctionExecutor::new(Arc::new(services));
        let mut invocation = FunctionInvocationService::new(Arc::new(registry.clone()), local);
        let remote = match (self.remote_caller, self.remote) {
            (Some(caller), _) => Some(caller),
            (None, Some(config)) => {
                Some(Arc::new(RemoteFunctionClient::new(&config)?) as Arc<dyn RemoteFunctionCaller>)
            }
            (None, None) => None,
        };
        if let Some(remote) = remote {
            invocation = invocation.with_remote(remote);
        }

        let triggers = TriggerRegistry::new(HandlerConfig {
            websocket: self.websocket_config,
            subscription: self.subscription_config,
        });

        tracing::info!(functions = registry.len(), "runtime built");
        Ok(Runtime {
            functions: registry,
            invocation: Arc::new(invocation),
            triggers: Arc::new(triggers),
            tracer: self.tracer.unwrap_or_else(|| Arc::new(LogInvocationTracer)),
            state: self
                .state
                .unwrap_or_else(|| Arc::new(InMemoryTriggerState::new())),
            queues: self.queues,
            dispatcher_config: self.dispatcher_config,
            spaces: Default::default(),
        })
    }
}
