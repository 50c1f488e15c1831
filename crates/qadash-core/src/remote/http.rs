//! reqwest implementation of the remote store

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::wire::{
    Ack, Created, Envelope, ErrorBody, HealthReport, RemoteTask, StatusBody, StatusChange,
};
use super::{RemoteError, RemoteResult, RemoteStore};
use crate::config::Config;
use crate::models::{Task, TaskFilter, TaskPatch, TaskPayload, TaskStatus};

/// HTTP client for the task API
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    request_timeout: Duration,
    probe_timeout: Duration,
}

impl HttpRemoteStore {
    /// Create a client for `base_url` (e.g. `http://localhost:3000/api`)
    pub fn new(base_url: &str, request_timeout: Duration, probe_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("qadash/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
            probe_timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.api_url,
            config.request_timeout(),
            config.probe_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode a 2xx JSON body
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> RemoteResult<T> {
        let response = request.timeout(timeout).send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(RemoteError::Http {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        serde_json::from_str(&body).map_err(|e| RemoteError::Http {
            status: status.as_u16(),
            message: format!("Invalid response body: {}", e),
        })
    }

    async fn send_ack(&self, request: RequestBuilder) -> RemoteResult<()> {
        let ack: Ack = self.send(request, self.request_timeout).await?;
        if ack.success == Some(false) {
            return Err(RemoteError::Http {
                status: StatusCode::OK.as_u16(),
                message: ack
                    .message
                    .unwrap_or_else(|| "Server reported failure".to_string()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_tasks(&self, filter: &TaskFilter) -> RemoteResult<Vec<Task>> {
        debug!(?filter, "GET /tasks");
        let request = self.client.get(self.url("/tasks")).query(&filter.query_pairs());
        let envelope: Envelope<Vec<RemoteTask>> = self.send(request, self.request_timeout).await?;
        Ok(envelope.data.into_iter().map(RemoteTask::into_task).collect())
    }

    async fn create_task(&self, payload: &TaskPayload) -> RemoteResult<Created> {
        debug!(title = %payload.title, "POST /tasks");
        let request = self.client.post(self.url("/tasks")).json(payload);
        let envelope: Envelope<Created> = self.send(request, self.request_timeout).await?;
        Ok(envelope.data)
    }

    async fn update_task(&self, id: i64, patch: &TaskPatch) -> RemoteResult<()> {
        debug!(id, "PUT /tasks/:id");
        let request = self.client.put(self.url(&format!("/tasks/{}", id))).json(patch);
        self.send_ack(request).await
    }

    async fn set_status(&self, id: i64, status: TaskStatus) -> RemoteResult<StatusChange> {
        debug!(id, %status, "PATCH /tasks/:id/status");
        let request = self
            .client
            .patch(self.url(&format!("/tasks/{}/status", id)))
            .json(&serde_json::json!({ "status": status }));
        let body: StatusBody = self.send(request, self.request_timeout).await?;
        Ok(StatusChange::from_body(body, status))
    }

    async fn delete_task(&self, id: i64) -> RemoteResult<()> {
        debug!(id, "DELETE /tasks/:id");
        let request = self.client.delete(self.url(&format!("/tasks/{}", id)));
        self.send_ack(request).await
    }

    async fn probe_health(&self) -> RemoteResult<HealthReport> {
        let request = self.client.get(self.url("/health"));
        self.send(request, self.probe_timeout).await
    }
}

/// Timeouts, refused connections and aborted transfers all mean "offline"
fn transport_error(e: reqwest::Error) -> RemoteError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    };
    RemoteError::Unreachable { reason }
}

/// The server's `{error}` text, else its `{message}`, else the status reason
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .error
        .or(parsed.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        })
}
