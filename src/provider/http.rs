//! HTTP provider client implementation.
//!
//! Speaks JSON over HTTP to a provider control plane. Synchronous
//! operations return the result directly; asynchronous operations answer
//! 202 with an operation id which is polled until the provider reports a
//! terminal status. Each worker owns its own poll loop.

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ProviderError, Result, StackformError};
use crate::state::OutputMap;

use super::api::{CreatedResource, Provider, ResolvedBag};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Default delay between operation polls in milliseconds.
const POLL_INTERVAL_MS: u64 = 2000;

/// Maximum number of polls before an operation counts as timed out.
const MAX_POLL_ATTEMPTS: u32 = 150;

/// HTTP client for the provider control plane.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    /// HTTP client.
    client: Client,
    /// Base URL of the control plane.
    base_url: String,
    /// API token.
    api_token: String,
    /// Delay between operation polls.
    poll_interval: Duration,
}

/// Direct resource response (synchronous create/update).
#[derive(Debug, Deserialize)]
struct ResourceResponse {
    id: String,
    #[serde(default)]
    outputs: OutputMap,
}

/// Outputs-only response (synchronous update).
#[derive(Debug, Deserialize)]
struct OutputsResponse {
    #[serde(default)]
    outputs: OutputMap,
}

/// Accepted-for-processing response (asynchronous operation).
#[derive(Debug, Deserialize)]
struct OperationAccepted {
    operation: String,
}

/// Status of an asynchronous operation.
#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    resource_id: Option<String>,
    #[serde(default)]
    outputs: OutputMap,
    #[serde(default)]
    error: Option<String>,
}

impl HttpProvider {
    /// Creates a new provider client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, api_token: &str) -> Result<Self> {
        Self::with_timeout(base_url, api_token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a provider client with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(base_url: &str, api_token: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
        })
    }

    /// Sets the delay between operation polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Issues a request with retries for transient failures, returning the
    /// raw response for status-specific handling.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{path}", self.base_url);
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES}");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                    .await;
            }

            match self.request_once(method.clone(), &url, body).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if e.is_retryable() {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            StackformError::Provider(ProviderError::NetworkError {
                message: String::from("Max retries exceeded"),
            })
        }))
    }

    /// Issues a single request and maps common failure statuses.
    async fn request_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        trace!("Provider request: {method} {url}");

        let mut builder = self
            .client
            .request(method, url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_token));

        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            StackformError::Provider(ProviderError::NetworkError {
                message: format!("Request failed: {e}"),
            })
        })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 60 } else { retry_after };

            return Err(StackformError::Provider(ProviderError::RateLimited {
                retry_after_secs: retry_after,
            }));
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StackformError::Provider(
                ProviderError::AuthenticationFailed {
                    message: String::from("Invalid API token"),
                },
            ));
        }

        Ok(response)
    }

    /// Parses a JSON body, mapping decode failures to `InvalidResponse`.
    async fn parse_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
        response.json::<T>().await.map_err(|e| {
            StackformError::Provider(ProviderError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            })
        })
    }

    /// Turns an unexpected response into an `OperationFailed` error.
    async fn operation_failed(response: reqwest::Response) -> StackformError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StackformError::Provider(ProviderError::operation(status, body))
    }

    /// Polls an asynchronous operation until the provider reports a
    /// terminal status.
    async fn poll_operation(&self, operation_id: &str) -> Result<OperationStatus> {
        for _ in 0..MAX_POLL_ATTEMPTS {
            let response = self
                .request(Method::GET, &format!("/v1/operations/{operation_id}"), None)
                .await?;

            if !response.status().is_success() {
                return Err(Self::operation_failed(response).await);
            }

            let status: OperationStatus = Self::parse_json(response).await?;
            match status.status.as_str() {
                "succeeded" => return Ok(status),
                "failed" => {
                    let message = status
                        .error
                        .unwrap_or_else(|| String::from("Operation failed without detail"));
                    return Err(StackformError::Provider(ProviderError::operation(
                        200, message,
                    )));
                }
                "pending" | "running" => {
                    trace!("Operation {operation_id} still {}", status.status);
                    tokio::time::sleep(self.poll_interval).await;
                }
                other => {
                    return Err(StackformError::Provider(ProviderError::InvalidResponse {
                        message: format!("Unknown operation status: {other}"),
                    }));
                }
            }
        }

        Err(StackformError::Provider(ProviderError::Timeout {
            operation_id: operation_id.to_string(),
        }))
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn create(&self, kind: &str, properties: &ResolvedBag) -> Result<CreatedResource> {
        debug!("Creating {kind} resource");
        let body = serde_json::json!({ "kind": kind, "properties": properties });
        let response = self.request(Method::POST, "/v1/resources", Some(&body)).await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let created: ResourceResponse = Self::parse_json(response).await?;
                Ok(CreatedResource {
                    provider_id: created.id,
                    outputs: created.outputs,
                })
            }
            StatusCode::ACCEPTED => {
                let accepted: OperationAccepted = Self::parse_json(response).await?;
                let status = self.poll_operation(&accepted.operation).await?;
                let provider_id = status.resource_id.ok_or_else(|| {
                    StackformError::Provider(ProviderError::InvalidResponse {
                        message: String::from("Create operation finished without a resource id"),
                    })
                })?;
                Ok(CreatedResource {
                    provider_id,
                    outputs: status.outputs,
                })
            }
            _ => Err(Self::operation_failed(response).await),
        }
    }

    async fn update(
        &self,
        kind: &str,
        provider_id: &str,
        properties: &ResolvedBag,
    ) -> Result<OutputMap> {
        debug!("Updating {kind} resource {provider_id}");
        let body = serde_json::json!({ "properties": properties });
        let response = self
            .request(
                Method::PATCH,
                &format!("/v1/resources/{provider_id}"),
                Some(&body),
            )
            .await?;

        match response.status() {
            StatusCode::OK => {
                let outputs: OutputsResponse = Self::parse_json(response).await?;
                Ok(outputs.outputs)
            }
            StatusCode::ACCEPTED => {
                let accepted: OperationAccepted = Self::parse_json(response).await?;
                let status = self.poll_operation(&accepted.operation).await?;
                Ok(status.outputs)
            }
            StatusCode::NOT_FOUND => Err(StackformError::Provider(ProviderError::NotFound {
                provider_id: provider_id.to_string(),
            })),
            _ => Err(Self::operation_failed(response).await),
        }
    }

    async fn delete(&self, kind: &str, provider_id: &str) -> Result<()> {
        debug!("Deleting {kind} resource {provider_id}");
        let response = self
            .request(
                Method::DELETE,
                &format!("/v1/resources/{provider_id}"),
                None,
            )
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::ACCEPTED => {
                let accepted: OperationAccepted = Self::parse_json(response).await?;
                self.poll_operation(&accepted.operation).await?;
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(StackformError::Provider(ProviderError::NotFound {
                provider_id: provider_id.to_string(),
            })),
            _ => Err(Self::operation_failed(response).await),
        }
    }
}
