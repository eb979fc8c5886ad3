//! Client half of the sync protocol.
//!
//! [`SyncTransport`] is the seam between the reconciliation controller and
//! the network. [`HttpTransport`] speaks the JSON endpoints over reqwest;
//! tests substitute in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use jobboard_common::Dashboard;
use jobboard_common::protocol::{
    AddJobRequest, DeleteTaskRequest, EditJobRequest, ErrorBody, MoveTaskRequest, SuccessResponse,
};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failure of one protocol call as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Validation failed: {message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    #[error("Unauthorized: sign in again")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Malformed response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn fetch(&self) -> Result<Dashboard, TransportError>;

    /// Returns the id the store assigned to the new job.
    async fn add(&self, req: &AddJobRequest) -> Result<String, TransportError>;

    async fn move_task(&self, req: &MoveTaskRequest) -> Result<(), TransportError>;

    async fn edit(&self, task_id: &str, req: &EditJobRequest) -> Result<(), TransportError>;

    async fn delete(&self, req: &DeleteTaskRequest) -> Result<(), TransportError>;
}

/// [`SyncTransport`] over HTTP with a bearer session token.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Transport whose underlying client gives up after `timeout`.
    pub fn with_timeout(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL of `segments` under the base URL, each one percent-encoded.
    fn segment_url(&self, segments: &[&str]) -> Result<reqwest::Url, TransportError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| TransportError::Network(format!("invalid server url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| TransportError::Network(format!("invalid server url: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn post<B: serde::Serialize + ?Sized>(
        &self,
        url: impl reqwest::IntoUrl,
        body: &B,
    ) -> Result<SuccessResponse, TransportError> {
        let req = self.authorize(self.client.post(url).json(body));
        let resp = req.send().await.map_err(network_error)?;
        decode(resp).await
    }
}

fn network_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Decode a success body, or map an error status and its [`ErrorBody`].
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return resp
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()));
    }

    let body = resp.json::<ErrorBody>().await.ok();
    let message = body
        .as_ref()
        .map(|b| b.error.clone())
        .unwrap_or_else(|| status.to_string());
    Err(match status.as_u16() {
        400 => TransportError::Validation {
            field: body.and_then(|b| b.field),
            message,
        },
        401 => TransportError::Unauthorized,
        404 => TransportError::NotFound(message),
        code => TransportError::Server {
            status: code,
            message,
        },
    })
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn fetch(&self) -> Result<Dashboard, TransportError> {
        let req = self.authorize(self.client.get(self.url("/dashboard")));
        let resp = req.send().await.map_err(network_error)?;
        decode(resp).await
    }

    async fn add(&self, req: &AddJobRequest) -> Result<String, TransportError> {
        let resp = self.post(self.url("/dashboard/add"), req).await?;
        resp.id
            .ok_or_else(|| TransportError::Decode("add response carried no id".to_string()))
    }

    async fn move_task(&self, req: &MoveTaskRequest) -> Result<(), TransportError> {
        self.post(self.url("/dashboard/update"), req).await.map(|_| ())
    }

    async fn edit(&self, task_id: &str, req: &EditJobRequest) -> Result<(), TransportError> {
        let url = self.segment_url(&["dashboard", "update", task_id])?;
        self.post(url, req).await.map(|_| ())
    }

    async fn delete(&self, req: &DeleteTaskRequest) -> Result<(), TransportError> {
        self.post(self.url("/dashboard/delete"), req).await.map(|_| ())
    }
}
