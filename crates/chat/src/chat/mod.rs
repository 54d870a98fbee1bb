/// Send and clear orchestration over one conversation.
pub mod controller;
pub mod error;
/// Receipts handed back by the controller.
pub mod events;
/// Shared, observable conversation log.
pub mod log;
/// Timeline entries, snapshots and the inline notices.
pub mod message;
pub mod proof;
pub mod reveal;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

/// Upper bound for configured timer periods, keeping `Instant` arithmetic in range.
pub(crate) const MAX_TIMER_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub use controller::{
    ConversationConfig, ConversationController, DEFAULT_CLEAR_DELAY, DEFAULT_EXPLORER_BASE,
};
pub use error::{ConversationError, SubmitRejection};
pub use events::{ClearTicket, SendOutcome, SendTicket};
pub use log::{MessageLog, ScopedLog};
pub use message::{
    BACKEND_ERROR_NOTICE, ConversationSnapshot, EntryId, Generation, NO_RESPONSE_NOTICE,
    PROOF_FAILED_NOTICE, PROOF_PENDING, PROOF_UNKNOWN_NOTICE, Role, TimelineEntry,
};
pub use proof::{ProofPollHandle, ProofPoller, ProofRequest, ProofResolution};
pub use reveal::{AnimationHandle, RevealAnimator, RevealOutcome};
