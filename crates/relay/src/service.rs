use std::time::Duration;

use futures::future::BoxFuture;
use snafu::Snafu;

use super::wire::{ChatRequest, ChatResponse, ProofStatus};

pub const DEFAULT_RELAY_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub base_url: String,
    pub request_timeout: Option<Duration>,
}

impl RelayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_URL)
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RelayError {
    #[snafu(display("relay url '{base_url}' must start with http:// or https://"))]
    InvalidBaseUrl {
        stage: &'static str,
        base_url: String,
    },
    #[snafu(display("failed to build HTTP client on `{stage}`, {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {url} failed on `{stage}`, {source}"))]
    Request {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("{url} returned status {status}: {body}"))]
    Status {
        stage: &'static str,
        url: String,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to read response body from {url} on `{stage}`, {source}"))]
    ReadBody {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("failed to decode response from {url} on `{stage}`, {source}"))]
    Decode {
        stage: &'static str,
        url: String,
        source: serde_json::Error,
    },
}

/// Chat completion relay: sends the whole conversation, receives the reply and its proof id.
pub trait ChatService: Send + Sync {
    fn chat(&self, request: ChatRequest) -> BoxFuture<'_, RelayResult<ChatResponse>>;
}

/// Proof status lookup for a previously returned proof id.
pub trait ProofService: Send + Sync {
    fn proof_status<'a>(&'a self, proof_id: &'a str) -> BoxFuture<'a, RelayResult<ProofStatus>>;
}
