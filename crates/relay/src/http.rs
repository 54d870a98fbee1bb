use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use snafu::{ResultExt, ensure};

use super::service::{
    BuildClientSnafu, ChatService, DecodeSnafu, InvalidBaseUrlSnafu, ProofService, ReadBodySnafu,
    RelayConfig, RelayResult, RequestSnafu, StatusSnafu,
};
use super::wire::{ChatRequest, ChatResponse, ProofStatus, RelayHealth};

/// Relay adapter speaking JSON over HTTP to the chat/proof backend.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: reqwest::Client,
    config: RelayConfig,
}

impl HttpRelay {
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        ensure!(
            config.base_url.starts_with("http://") || config.base_url.starts_with("https://"),
            InvalidBaseUrlSnafu {
                stage: "http-relay-new",
                base_url: config.base_url.clone(),
            }
        );

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context(BuildClientSnafu {
            stage: "build-client",
        })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path.trim_start_matches('/'))
    }

    pub async fn health(&self) -> RelayResult<RelayHealth> {
        let url = self.endpoint("health");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context(RequestSnafu {
                stage: "send-health-request",
                url: url.clone(),
            })?;
        Self::decode(response, url, "health").await
    }

    async fn post_chat(&self, request: ChatRequest) -> RelayResult<ChatResponse> {
        let url = self.endpoint("chat");
        tracing::debug!(
            url = %url,
            model = %request.model,
            message_count = request.messages.len(),
            "sending chat request"
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context(RequestSnafu {
                stage: "send-chat-request",
                url: url.clone(),
            })?;
        Self::decode(response, url, "chat").await
    }

    async fn get_proof(&self, proof_id: &str) -> RelayResult<ProofStatus> {
        let url = self.endpoint(&format!("proof/{proof_id}"));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context(RequestSnafu {
                stage: "send-proof-request",
                url: url.clone(),
            })?;
        Self::decode(response, url, "proof").await
    }

    async fn decode<T>(
        response: reqwest::Response,
        url: String,
        stage: &'static str,
    ) -> RelayResult<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        let body = response.text().await.context(ReadBodySnafu {
            stage,
            url: url.clone(),
        })?;

        if !status.is_success() {
            return StatusSnafu {
                stage,
                url,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        serde_json::from_str(&body).context(DecodeSnafu { stage, url })
    }
}

impl ChatService for HttpRelay {
    fn chat(&self, request: ChatRequest) -> BoxFuture<'_, RelayResult<ChatResponse>> {
        self.post_chat(request).boxed()
    }
}

impl ProofService for HttpRelay {
    fn proof_status<'a>(&'a self, proof_id: &'a str) -> BoxFuture<'a, RelayResult<ProofStatus>> {
        self.get_proof(proof_id).boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::RelayError;

    #[test]
    fn endpoints_join_without_duplicate_slashes() {
        let relay = HttpRelay::new(RelayConfig::new(" http://localhost:8000/ ")).unwrap();
        assert_eq!(relay.endpoint("chat"), "http://localhost:8000/chat");
        assert_eq!(relay.endpoint("/proof/abc"), "http://localhost:8000/proof/abc");
    }

    #[test]
    fn rejects_relay_url_without_scheme() {
        let error = HttpRelay::new(RelayConfig::new("localhost:8000")).unwrap_err();
        assert!(matches!(error, RelayError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn keeps_configured_timeout() {
        let config =
            RelayConfig::new("https://relay.example").with_request_timeout(Duration::from_secs(5));
        let relay = HttpRelay::new(config).unwrap();
        assert_eq!(relay.config().request_timeout, Some(Duration::from_secs(5)));
    }
}
