//! HTTP implementation of the backend endpoints

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::{
    ChatFeedback, ChatQuery, RagQuery, RagResponse, StepFeedback, WorkflowBackend,
    WorkflowResponse,
};
use crate::config::BackendConfig;
use crate::{Error, Result};

/// JSON-over-HTTP backend client
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<SecretString>,
}

impl HttpBackend {
    /// Create a client for the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        tracing::debug!(base_url = %config.base_url, "backend client initialized");

        Ok(Self {
            client,
            base_url: config.base_url,
            api_token: config.api_token,
        })
    }

    /// Base URL endpoints are resolved against
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// POST a JSON body and decode a JSON reply
    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;
        tracing::debug!(%url, "backend request");

        let mut request = self.client.post(url.clone()).json(body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(%url, error = %e, "backend request failed");
            if e.is_timeout() { Error::Timeout } else { Error::Http(e) }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%url, status = %status, body = %body, "backend error");
            return Err(Error::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = response.json::<R>().await.map_err(|e| {
            tracing::error!(%url, error = %e, "failed to parse backend response");
            e
        })?;
        Ok(parsed)
    }
}

#[async_trait]
impl WorkflowBackend for HttpBackend {
    async fn chat_query(&self, request: &ChatQuery) -> Result<WorkflowResponse> {
        self.post_json("chat/query", request).await
    }

    async fn chat_feedback(&self, request: &ChatFeedback) -> Result<WorkflowResponse> {
        self.post_json("chat/feedback", request).await
    }

    async fn step_feedback(
        &self,
        work_order_id: &str,
        request: &StepFeedback,
    ) -> Result<WorkflowResponse> {
        let path = format!("workorders/{}/feedback", urlencoding::encode(work_order_id));
        self.post_json(&path, request).await
    }

    async fn rag_query(&self, request: &RagQuery) -> Result<RagResponse> {
        self.post_json("agentic-rag/query", request).await
    }
}
