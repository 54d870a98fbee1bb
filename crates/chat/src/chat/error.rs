use cryptai_relay::RelayError;
use snafu::Snafu;

/// Failures scoped to a single message; none of them end the conversation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConversationError {
    #[snafu(display("chat relay failed on `{stage}`, {source}"))]
    Network {
        stage: &'static str,
        source: RelayError,
    },
    #[snafu(display("proof {proof_id} failed: {reason}"))]
    Proof { proof_id: String, reason: String },
    #[snafu(display("proof {proof_id} unresolved after {elapsed_ms} ms"))]
    ProofTimeout { proof_id: String, elapsed_ms: u128 },
    #[snafu(display("proof {proof_id} status query failed, {source}"))]
    ProofTransient {
        proof_id: String,
        source: RelayError,
    },
}

/// Reasons a submission is refused before anything is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum SubmitRejection {
    #[snafu(display("input is empty"))]
    Blank,
    #[snafu(display("a reply is still being revealed"))]
    Busy,
    #[snafu(display("the conversation is being cleared"))]
    Dissolving,
}
