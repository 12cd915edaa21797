//! HTTP client for deployed functions.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::InvocationError;
use crate::runtime::RemoteConfig;
use crate::traits::{RemoteCallOptions, RemoteFunctionCaller};

/// Invokes deployed functions with
/// `POST {endpoint}/functions/{id}?spaceId=..&subjectId=..`.
#[derive(Debug, Clone)]
pub struct RemoteFunctionClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RemoteFunctionClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, InvocationError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InvocationError::Transport {
                message: format!("failed to build http client: {e}"),
            })?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn function_url(&self, function_id: &str) -> String {
        format!("{}/functions/{function_id}", self.endpoint)
    }
}

#[async_trait]
impl RemoteFunctionCaller for RemoteFunctionClient {
    async fn call(
        &self,
        function_id: &str,
        input: Value,
        options: &RemoteCallOptions,
    ) -> Result<Value, InvocationError> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(space_id) = &options.space_id {
            query.push(("spaceId", space_id.as_str()));
        }
        if let Some(subject_id) = &options.subject_id {
            query.push(("subjectId", subject_id.as_str()));
        }

        let url = self.function_url(function_id);
        tracing::debug!(%url, "invoking deployed function");

        let response = self
            .http
            .post(&url)
            .query(&query)
            .json(&input)
            .send()
            .await
            .map_err(|e| InvocationError::Transport {
                message: format!("request to {url} failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(function_id, status = status.as_u16(), "deployed function failed");
            return Err(InvocationError::Remote {
                function_id: function_id.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| InvocationError::Transport {
            message: format!("failed to read response body: {e}"),
        })?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| InvocationError::Transport {
            message: format!("invalid response body: {e}"),
        })
    }
}
