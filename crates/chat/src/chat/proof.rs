use std::panic;
use std::sync::Arc;
use std::time::Duration;

use cryptai_relay::{ProofService, ProofState, ProofStatus};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::MAX_TIMER_PERIOD;
use super::error::ConversationError;
use super::log::ScopedLog;
use super::message::{
    EntryId, PROOF_FAILED_NOTICE, PROOF_UNKNOWN_NOTICE, proof_link, settle_pending_proof,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_500);
pub const DEFAULT_PROOF_TIMEOUT: Duration = Duration::from_millis(45_000);

/// Which proof to follow and where its marker lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofRequest {
    pub entry: EntryId,
    pub proof_id: String,
    pub explorer_base: String,
}

#[derive(Debug)]
pub enum ProofResolution {
    Confirmed { tx_hash: String, link: String },
    Failed(ConversationError),
    TimedOut(ConversationError),
    /// The conversation was cleared while polling.
    Superseded,
    Cancelled,
}

pub struct ProofPoller {
    service: Arc<dyn ProofService>,
    interval: Duration,
    timeout: Duration,
}

/// One poll cycle; ends on resolution, timeout or cancellation.
#[derive(Debug)]
pub struct ProofPollHandle {
    proof_id: String,
    started_at: Instant,
    task: JoinHandle<ProofResolution>,
}

enum Verdict {
    Confirmed { tx_hash: String, link: String },
    Failed { reason: String },
}

impl ProofPoller {
    pub fn new(service: Arc<dyn ProofService>, interval: Duration, timeout: Duration) -> Self {
        Self {
            service,
            interval: interval.clamp(Duration::from_millis(1), MAX_TIMER_PERIOD),
            timeout: timeout.min(MAX_TIMER_PERIOD),
        }
    }

    pub fn with_defaults(service: Arc<dyn ProofService>) -> Self {
        Self::new(service, DEFAULT_POLL_INTERVAL, DEFAULT_PROOF_TIMEOUT)
    }

    pub fn start(&self, log: ScopedLog, request: ProofRequest) -> ProofPollHandle {
        let started_at = Instant::now();
        let proof_id = request.proof_id.clone();
        tracing::debug!(proof_id = %proof_id, entry = request.entry.0, "starting proof poll");

        let task = tokio::spawn(poll_until_settled(
            self.service.clone(),
            log,
            request,
            started_at,
            self.interval,
            self.timeout,
        ));

        ProofPollHandle {
            proof_id,
            started_at,
            task,
        }
    }
}

impl ProofPollHandle {
    pub fn proof_id(&self) -> &str {
        &self.proof_id
    }

    /// Instant the timeout is measured from.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub async fn finished(self) -> ProofResolution {
        match self.task.await {
            Ok(resolution) => resolution,
            Err(error) if error.is_cancelled() => ProofResolution::Cancelled,
            Err(error) => panic::resume_unwind(error.into_panic()),
        }
    }
}

async fn poll_until_settled(
    service: Arc<dyn ProofService>,
    log: ScopedLog,
    request: ProofRequest,
    started_at: Instant,
    interval: Duration,
    timeout: Duration,
) -> ProofResolution {
    let ProofRequest {
        entry,
        proof_id,
        explorer_base,
    } = request;

    let deadline = started_at + timeout;
    let mut ticker = time::interval_at(started_at + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if !log.is_current() {
            tracing::debug!(proof_id = %proof_id, "conversation cleared; dropping proof poll");
            return ProofResolution::Superseded;
        }

        // A query still outstanding at the ceiling must not hold the poll open.
        let Ok(answer) = time::timeout_at(deadline, service.proof_status(&proof_id)).await else {
            tracing::warn!(proof_id = %proof_id, "proof status query still pending at the ceiling");
            return give_up(&log, entry, proof_id, started_at);
        };

        match answer {
            Ok(status) => match classify(&status, &explorer_base) {
                Some(Verdict::Confirmed { tx_hash, link }) => {
                    if !log.replace_entry(entry, |content| settle(content, &proof_link(&link))) {
                        return ProofResolution::Superseded;
                    }
                    tracing::info!(proof_id = %proof_id, tx_hash = %tx_hash, "proof confirmed");
                    return ProofResolution::Confirmed { tx_hash, link };
                }
                Some(Verdict::Failed { reason }) => {
                    if !log.replace_entry(entry, |content| settle(content, PROOF_FAILED_NOTICE)) {
                        return ProofResolution::Superseded;
                    }
                    let error = ConversationError::Proof {
                        proof_id: proof_id.clone(),
                        reason,
                    };
                    tracing::warn!(error = %error, "proof failed");
                    return ProofResolution::Failed(error);
                }
                None => {
                    tracing::debug!(
                        proof_id = %proof_id,
                        status = ?status.status,
                        "proof still pending"
                    );
                }
            },
            Err(source) => {
                let error = ConversationError::ProofTransient {
                    proof_id: proof_id.clone(),
                    source,
                };
                tracing::warn!(error = %error, "proof poll failed; retrying on next tick");
            }
        }

        if started_at.elapsed() > timeout {
            return give_up(&log, entry, proof_id, started_at);
        }
    }
}

fn give_up(
    log: &ScopedLog,
    entry: EntryId,
    proof_id: String,
    started_at: Instant,
) -> ProofResolution {
    if !log.replace_entry(entry, |content| settle(content, PROOF_UNKNOWN_NOTICE)) {
        return ProofResolution::Superseded;
    }
    let error = ConversationError::ProofTimeout {
        proof_id,
        elapsed_ms: started_at.elapsed().as_millis(),
    };
    tracing::warn!(error = %error, "giving up on proof");
    ProofResolution::TimedOut(error)
}

fn classify(status: &ProofStatus, explorer_base: &str) -> Option<Verdict> {
    match status.status {
        ProofState::Ok => {
            let tx_hash = status
                .tx_hash
                .as_deref()
                .filter(|hash| !hash.is_empty())?;
            let link = status
                .explorer_url
                .as_deref()
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{explorer_base}{tx_hash}"));
            Some(Verdict::Confirmed {
                tx_hash: tx_hash.to_string(),
                link,
            })
        }
        ProofState::Error => Some(Verdict::Failed {
            reason: status
                .error
                .clone()
                .unwrap_or_else(|| "relay reported an error".to_string()),
        }),
        ProofState::Pending | ProofState::Unknown => None,
    }
}

fn settle(content: &str, replacement: &str) -> String {
    settle_pending_proof(content, replacement).unwrap_or_else(|| content.to_string())
}
