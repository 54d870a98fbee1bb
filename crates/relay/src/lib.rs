//! Client side of the chat relay: wire types, service traits and the HTTP adapter.

mod http;
mod service;
mod wire;

pub use http::HttpRelay;
pub use service::{
    ChatService, DEFAULT_RELAY_URL, ProofService, RelayConfig, RelayError, RelayResult,
};
pub use wire::{
    ChatRequest, ChatResponse, DEFAULT_MODEL, ProofState, ProofStatus, RelayHealth, RelayMessage,
    Role,
};
