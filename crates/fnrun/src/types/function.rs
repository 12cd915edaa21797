//! Function definitions and their persisted form.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DbObject;
use crate::errors::DatabaseError;
use crate::traits::FunctionHandler;

/// Typename of stored function objects.
pub const FUNCTION_TYPENAME: &str = "fnrun.function";

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Capabilities a function may declare it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Database,
    Queue,
    Credentials,
    Ai,
    Tracing,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 5] = [
        ServiceKind::Database,
        ServiceKind::Queue,
        ServiceKind::Credentials,
        ServiceKind::Ai,
        ServiceKind::Tracing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Queue => "queue",
            Self::Credentials => "credentials",
            Self::Ai => "ai",
            Self::Tracing => "tracing",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of capabilities declared by one function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceSet(BTreeSet<ServiceKind>);

impl ServiceSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn contains(&self, kind: ServiceKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = ServiceKind> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ServiceKind> for ServiceSet {
    fn from_iter<I: IntoIterator<Item = ServiceKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[ServiceKind; N]> for ServiceSet {
    fn from(kinds: [ServiceKind; N]) -> Self {
        kinds.into_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// A user function: metadata, schemas, declared capabilities and handler.
///
/// Resolved by `key`, never by identity. Cheap to clone.
#[derive(Clone)]
pub struct FunctionDefinition {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    /// JSON Schema for input. `None` accepts anything.
    pub input_schema: Option<Value>,
    /// JSON Schema for output. `None` accepts anything.
    pub output_schema: Option<Value>,
    pub services: ServiceSet,
    pub handler: Arc<dyn FunctionHandler>,
}

impl FunctionDefinition {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        handler: impl FunctionHandler + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: None,
            input_schema: None,
            output_schema: None,
            services: ServiceSet::none(),
            handler: Arc::new(handler),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_services(mut self, services: impl Into<ServiceSet>) -> Self {
        self.services = services.into();
        self
    }

    /// Persisted form of this definition, without the handler.
    pub fn serialize(&self) -> SerializedFunction {
        SerializedFunction {
            key: self.key.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
            output_schema: self.output_schema.clone(),
            services: self.services.clone(),
            deployment_id: None,
        }
    }
}

impl fmt::Debug for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDefinition")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

/// Stored function metadata. A `deployment_id` routes invocation to the
/// remote endpoint instead of an in-process handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedFunction {
    pub key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "ServiceSet::is_empty")]
    pub services: ServiceSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
}

impl SerializedFunction {
    pub fn with_deployment(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self
    }

    /// Stored functions use their key as object id.
    pub fn to_object(&self) -> Result<DbObject, DatabaseError> {
        let data = serde_json::to_value(self).map_err(|e| DatabaseError::Decode {
            id: self.key.clone(),
            message: e.to_string(),
        })?;
        Ok(DbObject::with_id(self.key.clone(), FUNCTION_TYPENAME, data))
    }

    pub fn from_object(object: &DbObject) -> Result<Self, DatabaseError> {
        if object.typename != FUNCTION_TYPENAME {
            return Err(DatabaseError::Decode {
                id: object.id.clone(),
                message: format!("expected {FUNCTION_TYPENAME}, found {}", object.typename),
            });
        }
        object.decode()
    }
}
