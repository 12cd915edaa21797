//! Credentials providers backed by environment variables or static config.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::errors::CredentialsError;
use crate::traits::CredentialsProvider;

/// Reads credentials from environment variables.
///
/// `get("openai")` reads `{prefix}OPENAI` (service name uppercased, `-` and
/// `.` mapped to `_`). `list_services()` returns an empty list since
/// environment variables cannot be enumerated portably.
pub struct EnvCredentials {
    prefix: String,
}

impl EnvCredentials {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn var_name(&self, service: &str) -> String {
        let name: String = service
            .chars()
            .map(|c| match c {
                '-' | '.' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{name}", self.prefix)
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new("FNRUN_CREDENTIAL_")
    }
}

#[async_trait]
impl CredentialsProvider for EnvCredentials {
    async fn get(&self, service: &str) -> Result<Option<String>, CredentialsError> {
        let key = self.var_name(service);
        match std::env::var(&key) {
            Ok(val) => Ok(Some(val)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(CredentialsError::Provider {
                message: format!("failed to read env var {key}: {e}"),
            }),
        }
    }

    async fn list_services(&self) -> Result<Vec<String>, CredentialsError> {
        Ok(vec![])
    }
}

/// Fixed set of credentials, e.g. loaded from a config file or set in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    credentials: BTreeMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, service: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.credentials.insert(service.into(), api_key.into());
        self
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn get(&self, service: &str) -> Result<Option<String>, CredentialsError> {
        Ok(self.credentials.get(service).cloned())
    }

    async fn list_services(&self) -> Result<Vec<String>, CredentialsError> {
        Ok(self.credentials.keys().cloned().collect())
    }
}
