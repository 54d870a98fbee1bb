use std::panic;

use tokio::task::JoinHandle;

use crate::chat::error::ConversationError;
use crate::chat::message::{EntryId, Generation};

/// How an accepted send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The reply is fully shown; polling runs in the background when a proof id came back.
    Revealed {
        entry: EntryId,
        proof_id: Option<String>,
    },
    /// A clear interrupted the send before the reply was fully shown.
    Cleared,
}

/// Receipt for an accepted submission.
///
/// The user entry is already in the log when this is returned. Dropping the ticket
/// leaves the send running.
#[derive(Debug)]
pub struct SendTicket {
    pub(crate) generation: Generation,
    pub(crate) user_entry: EntryId,
    pub(crate) task: JoinHandle<Result<SendOutcome, ConversationError>>,
}

impl SendTicket {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn user_entry(&self) -> EntryId {
        self.user_entry
    }

    pub async fn outcome(self) -> Result<SendOutcome, ConversationError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(error) if error.is_cancelled() => Ok(SendOutcome::Cleared),
            Err(error) => panic::resume_unwind(error.into_panic()),
        }
    }
}

/// Receipt for a clear; resolves once the presentation delay has elapsed.
#[derive(Debug)]
pub struct ClearTicket {
    pub(crate) generation: Generation,
    pub(crate) task: JoinHandle<bool>,
}

impl ClearTicket {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// True when this clear performed the reset, false when a later clear took over.
    pub async fn finished(self) -> bool {
        match self.task.await {
            Ok(reset) => reset,
            Err(error) if error.is_cancelled() => false,
            Err(error) => panic::resume_unwind(error.into_panic()),
        }
    }
}
