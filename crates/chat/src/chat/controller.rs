use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cryptai_relay::{
    ChatRequest, ChatResponse, ChatService, DEFAULT_MODEL, ProofService, RelayMessage,
};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time;

use super::error::{ConversationError, SubmitRejection};
use super::events::{ClearTicket, SendOutcome, SendTicket};
use super::log::{AcceptedSend, MessageLog};
use super::message::{
    BACKEND_ERROR_NOTICE, ConversationSnapshot, Generation, NO_RESPONSE_NOTICE,
};
use super::proof::{
    DEFAULT_POLL_INTERVAL, DEFAULT_PROOF_TIMEOUT, ProofPollHandle, ProofPoller, ProofRequest,
};
use super::reveal::{DEFAULT_REVEAL_INTERVAL, RevealAnimator, RevealOutcome};

pub const DEFAULT_EXPLORER_BASE: &str = "https://amoy.polygonscan.com/tx/";
pub const DEFAULT_CLEAR_DELAY: Duration = Duration::from_millis(2_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationConfig {
    pub model: String,
    /// Used when the relay does not name an explorer for a proof.
    pub explorer_base: String,
    pub reveal_interval: Duration,
    pub poll_interval: Duration,
    pub proof_timeout: Duration,
    /// How long the dissolve lasts before the log is emptied.
    pub clear_delay: Duration,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            explorer_base: DEFAULT_EXPLORER_BASE.to_string(),
            reveal_interval: DEFAULT_REVEAL_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            proof_timeout: DEFAULT_PROOF_TIMEOUT,
            clear_delay: DEFAULT_CLEAR_DELAY,
        }
    }
}

/// Owns one conversation: accepts submissions, talks to the relay and clears.
///
/// Cheap to clone; clones drive the same conversation.
#[derive(Clone)]
pub struct ConversationController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    log: MessageLog,
    chat: Arc<dyn ChatService>,
    animator: RevealAnimator,
    poller: ProofPoller,
    config: ConversationConfig,
    in_flight: Mutex<InFlight>,
}

#[derive(Default)]
struct InFlight {
    send: Option<AbortHandle>,
    animation: Option<AbortHandle>,
    proof: Option<ProofPollHandle>,
}

impl InFlight {
    fn cancel_all(&mut self) {
        if let Some(send) = self.send.take() {
            send.abort();
        }
        if let Some(animation) = self.animation.take() {
            animation.abort();
        }
        if let Some(proof) = self.proof.take() {
            tracing::debug!(proof_id = %proof.proof_id(), "cancelling proof poll");
            proof.cancel();
        }
    }
}

impl ConversationController {
    pub fn new(
        chat: Arc<dyn ChatService>,
        proofs: Arc<dyn ProofService>,
        config: ConversationConfig,
    ) -> Self {
        let animator = RevealAnimator::new(config.reveal_interval);
        let poller = ProofPoller::new(proofs, config.poll_interval, config.proof_timeout);
        Self {
            inner: Arc::new(ControllerInner {
                log: MessageLog::new(),
                chat,
                animator,
                poller,
                config,
                in_flight: Mutex::new(InFlight::default()),
            }),
        }
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.inner.config
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.inner.log.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.inner.log.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.log.snapshot().busy
    }

    /// Appends the user entry right away and sends the conversation to the relay.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, input: &str) -> Result<SendTicket, SubmitRejection> {
        if input.trim().is_empty() {
            return Err(SubmitRejection::Blank);
        }

        let accepted = self.inner.log.begin_send(input).inspect_err(|rejection| {
            tracing::debug!(%rejection, "submission refused");
        })?;
        let generation = accepted.generation;
        let user_entry = accepted.user_entry;
        tracing::debug!(
            generation = generation.0,
            entry = user_entry.0,
            history = accepted.history.len(),
            "submission accepted"
        );

        let task = tokio::spawn(run_send(self.inner.clone(), accepted));
        self.inner
            .register(generation, task.abort_handle(), |in_flight| &mut in_flight.send);

        Ok(SendTicket {
            generation,
            user_entry,
            task,
        })
    }

    /// Starts the dissolve and stops every timer of the current conversation.
    ///
    /// The log empties once the clear delay has passed, unless another clear
    /// starts in the meantime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn clear(&self) -> ClearTicket {
        let generation = self.inner.log.begin_clear();
        self.inner.lock_in_flight().cancel_all();
        tracing::info!(generation = generation.0, "clearing conversation");

        let log = self.inner.log.clone();
        let delay = self.inner.config.clear_delay;
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            let reset = log.finish_clear(generation);
            if reset {
                tracing::debug!(generation = generation.0, "conversation cleared");
            } else {
                tracing::debug!(generation = generation.0, "clear superseded by a later one");
            }
            reset
        });

        ClearTicket { generation, task }
    }
}

impl ControllerInner {
    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a handle for `generation`, or cancels it when a clear already moved on.
    fn register<H: Cancel>(
        &self,
        generation: Generation,
        handle: H,
        slot: impl FnOnce(&mut InFlight) -> &mut Option<H>,
    ) {
        let mut in_flight = self.lock_in_flight();
        if self.log.generation() != generation {
            handle.cancel_now();
            return;
        }
        // A replaced poller is detached; it stops on its own once the conversation moves on.
        *slot(&mut in_flight) = Some(handle);
    }
}

trait Cancel {
    fn cancel_now(&self);
}

impl Cancel for AbortHandle {
    fn cancel_now(&self) {
        self.abort();
    }
}

impl Cancel for ProofPollHandle {
    fn cancel_now(&self) {
        self.cancel();
    }
}

async fn run_send(
    inner: Arc<ControllerInner>,
    accepted: AcceptedSend,
) -> Result<SendOutcome, ConversationError> {
    let AcceptedSend {
        generation,
        history,
        ..
    } = accepted;
    let log = inner.log.scoped(generation);

    let messages = history
        .into_iter()
        .map(|entry| RelayMessage::new(entry.role, entry.content))
        .collect();
    let request = ChatRequest::new(inner.config.model.clone(), messages);

    let response = match inner.chat.chat(request).await {
        Ok(response) => response,
        Err(source) => {
            tracing::warn!(error = %source, "chat request failed");
            log.fail_send(BACKEND_ERROR_NOTICE);
            return Err(ConversationError::Network {
                stage: "send-chat-request",
                source,
            });
        }
    };

    if let Some(status_url) = response.proof_status_url.as_deref() {
        tracing::debug!(proof_status_url = %status_url, "relay returned a proof status url");
    }
    let ReplyParts {
        reply,
        proof_id,
        explorer_base,
    } = ReplyParts::from_response(response, &inner.config.explorer_base);

    let Some(animation) = inner.animator.start(log.clone(), reply) else {
        return Ok(SendOutcome::Cleared);
    };
    inner.register(generation, animation.abort_handle(), |in_flight| {
        &mut in_flight.animation
    });

    let entry = match animation.finished().await {
        RevealOutcome::Completed { entry } => entry,
        RevealOutcome::Superseded | RevealOutcome::Cancelled => {
            return Ok(SendOutcome::Cleared);
        }
    };

    if let Some(proof_id) = proof_id.as_deref() {
        let handle = inner.poller.start(
            log,
            ProofRequest {
                entry,
                proof_id: proof_id.to_string(),
                explorer_base,
            },
        );
        inner.register(generation, handle, |in_flight| &mut in_flight.proof);
    }

    Ok(SendOutcome::Revealed { entry, proof_id })
}

/// Relay reply with the presentation defaults applied.
#[derive(Debug, PartialEq, Eq)]
struct ReplyParts {
    reply: String,
    proof_id: Option<String>,
    explorer_base: String,
}

impl ReplyParts {
    fn from_response(response: ChatResponse, default_explorer: &str) -> Self {
        let non_blank = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
        Self {
            reply: response
                .reply
                .unwrap_or_else(|| NO_RESPONSE_NOTICE.to_string()),
            proof_id: non_blank(response.proof_id),
            explorer_base: non_blank(response.explorer_base)
                .unwrap_or_else(|| default_explorer.to_string()),
        }
    }
}
