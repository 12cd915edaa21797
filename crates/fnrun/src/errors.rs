//! Error types for collaborator traits, function invocation and triggers.

use thiserror::Error;

use crate::types::{ServiceKind, TriggerKind};

/// Errors from [`Database`](super::traits::Database).
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("object not found: {id}")]
    NotFound { id: String },
    #[error("failed to decode object {id}: {message}")]
    Decode { id: String, message: String },
    #[error("database error: {message}")]
    Store { message: String },
}

/// Errors from [`QueueService`](super::traits::QueueService).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue not found: {queue}")]
    NotFound { queue: String },
    #[error("queue error: {message}")]
    Queue { message: String },
}

/// Errors from [`CredentialsProvider`](super::traits::CredentialsProvider).
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("credential not found: {service}")]
    NotFound { service: String },
    #[error("credentials provider error: {message}")]
    Provider { message: String },
}

/// Errors from [`AiService`](super::traits::AiService).
#[derive(Debug, Error)]
pub enum AiError {
    #[error("ai provider error: {message}")]
    Provider { message: String },
}

/// Errors from [`TriggerStateStore`](super::traits::TriggerStateStore).
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state store error: {message}")]
    Store { message: String },
}

/// Capability resolution failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The runtime has no backend for a capability the function requires.
    #[error("service not available: {service}")]
    NotAvailable { service: ServiceKind },
    /// The function reached for a capability it never declared.
    #[error("service not declared by function: {service}")]
    NotDeclared { service: ServiceKind },
}

/// Errors raised from inside a function handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{message}")]
    Failed { message: String },
    #[error("handler panicked: {message}")]
    Panicked { message: String },
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error(transparent)]
    Ai(#[from] AiError),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Errors from executing a single function definition.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("invalid input for function '{function}': {message}")]
    InvalidInput { function: String, message: String },
    #[error("invalid output from function '{function}': {message}")]
    InvalidOutput { function: String, message: String },
    #[error("function '{function}' requires unavailable service: {service}")]
    ServiceNotAvailable {
        function: String,
        service: ServiceKind,
    },
    #[error("function '{function}' failed: {cause}")]
    Execution {
        function: String,
        #[source]
        cause: HandlerError,
    },
}

impl FunctionError {
    /// Name of the function that raised the error.
    pub fn function(&self) -> &str {
        match self {
            Self::InvalidInput { function, .. }
            | Self::InvalidOutput { function, .. }
            | Self::ServiceNotAvailable { function, .. }
            | Self::Execution { function, .. } => function,
        }
    }
}

/// Errors from the function invocation service (local or remote).
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Function(#[from] FunctionError),
    #[error("function not resolved: {key}")]
    NotResolved { key: String },
    #[error("no remote caller configured for deployed function {function_id}")]
    RemoteUnavailable { function_id: String },
    #[error("remote function {function_id} returned {status}: {body}")]
    Remote {
        function_id: String,
        status: u16,
        body: String,
    },
    #[error("transport error: {message}")]
    Transport { message: String },
}

/// Errors from trigger activation.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("trigger config error: {message}")]
    Config { message: String },
    #[error("trigger runtime error: {message}")]
    Runtime { message: String },
    #[error("trigger {trigger_id} is not registered in space {space}")]
    NotRegistered { space: String, trigger_id: String },
    #[error("trigger {trigger_id} is already active")]
    AlreadyActive { trigger_id: String },
    #[error("space not open: {space}")]
    SpaceNotOpen { space: String },
    #[error("{kind} triggers cannot be mounted")]
    Unsupported { kind: TriggerKind },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Errors from the trigger dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Programming error, e.g. invoking a disabled trigger.
    #[error("defect: {message}")]
    Defect { message: String },
    #[error("function not found: {reference}")]
    FunctionNotFound { reference: String },
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

impl DispatchError {
    pub fn defect(message: impl Into<String>) -> Self {
        Self::Defect {
            message: message.into(),
        }
    }

    pub fn is_defect(&self) -> bool {
        matches!(self, Self::Defect { .. })
    }
}

/// Errors from assembling or driving a [`Runtime`](crate::runtime::Runtime).
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime config error: {message}")]
    Config { message: String },
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_error_names_function() {
        let err = FunctionError::Execution {
            function: "reply".into(),
            cause: HandlerError::failed("boom"),
        };
        assert_eq!(err.function(), "reply");
        assert_eq!(err.to_string(), "function 'reply' failed: boom");
    }

    #[test]
    fn test_defect_classification() {
        assert!(DispatchError::defect("disabled").is_defect());
        let not_found = DispatchError::FunctionNotFound {
            reference: "fn-1".into(),
        };
        assert!(!not_found.is_defect());
    }

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::NotAvailable {
            service: ServiceKind::Queue,
        };
        assert_eq!(err.to_string(), "service not available: queue");
    }
}
