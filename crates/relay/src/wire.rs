use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "llama3-70b-8192";

/// Chat speaker role as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub role: Role,
    pub content: String,
}

impl RelayMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of `POST /chat`: the full conversation including the newest user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<RelayMessage>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<RelayMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
        }
    }
}

/// Body returned by `POST /chat`.
///
/// Every field is optional on the wire; callers decide the fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub proof_id: Option<String>,
    #[serde(default)]
    pub proof_status_url: Option<String>,
    #[serde(default)]
    pub explorer_base: Option<String>,
}

impl ChatResponse {
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            ..Self::default()
        }
    }

    pub fn with_proof(mut self, proof_id: impl Into<String>) -> Self {
        self.proof_id = Some(proof_id.into());
        self
    }

    pub fn with_explorer_base(mut self, explorer_base: impl Into<String>) -> Self {
        self.explorer_base = Some(explorer_base.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofState {
    Ok,
    Pending,
    Error,
    /// The relay does not know the proof yet, or sent a status this client predates.
    #[serde(other)]
    Unknown,
}

/// Body returned by `GET /proof/{proof_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProofStatus {
    pub status: ProofState,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub explorer_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProofStatus {
    pub fn pending() -> Self {
        Self {
            status: ProofState::Pending,
            tx_hash: None,
            explorer_url: None,
            error: None,
        }
    }

    pub fn confirmed(tx_hash: impl Into<String>) -> Self {
        Self {
            status: ProofState::Ok,
            tx_hash: Some(tx_hash.into()),
            ..Self::pending()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ProofState::Error,
            error: Some(error.into()),
            ..Self::pending()
        }
    }

    pub fn with_explorer_url(mut self, explorer_url: impl Into<String>) -> Self {
        self.explorer_url = Some(explorer_url.into());
        self
    }
}

/// Body returned by `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelayHealth {
    pub ok: bool,
    #[serde(default)]
    pub chain_connected: bool,
    #[serde(default, rename = "err")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serializes_lowercase_roles() {
        let request = ChatRequest::new(
            DEFAULT_MODEL,
            vec![
                RelayMessage::new(Role::User, "hi"),
                RelayMessage::new(Role::Assistant, "hello"),
            ],
        );

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "llama3-70b-8192");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][1]["role"], "assistant");
        assert_eq!(value["messages"][1]["content"], "hello");
    }

    #[test]
    fn chat_response_tolerates_nulls_and_missing_fields() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"reply":"⚠️ LLM error. Try again.","proof_id":null}"#)
                .unwrap();
        assert_eq!(response.reply.as_deref(), Some("⚠️ LLM error. Try again."));
        assert_eq!(response.proof_id, None);
        assert_eq!(response.explorer_base, None);

        let empty: ChatResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, ChatResponse::default());
    }

    #[test]
    fn proof_status_maps_unrecognized_states_to_unknown() {
        let status: ProofStatus =
            serde_json::from_str(r#"{"status":"unknown","tx_hash":null,"explorer_url":null}"#)
                .unwrap();
        assert_eq!(status.status, ProofState::Unknown);

        let status: ProofStatus = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(status.status, ProofState::Unknown);

        let status: ProofStatus = serde_json::from_str(
            r#"{
                "status": "ok",
                "tx_hash": "0xABC",
                "explorer_url": "https://amoy.polygonscan.com/tx/0xABC",
                "error": null
            }"#,
        )
        .unwrap();
        let expected = ProofStatus::confirmed("0xABC")
            .with_explorer_url("https://amoy.polygonscan.com/tx/0xABC");
        assert_eq!(status, expected);
    }

    #[test]
    fn health_reads_error_field() {
        let health: RelayHealth =
            serde_json::from_str(r#"{"ok":true,"chain_connected":false,"err":"timeout"}"#)
                .unwrap();
        assert!(health.ok);
        assert!(!health.chain_connected);
        assert_eq!(health.error.as_deref(), Some("timeout"));
    }
}
