use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};

use super::MAX_TIMER_PERIOD;
use super::log::ScopedLog;
use super::message::{EntryId, Role};

pub const DEFAULT_REVEAL_INTERVAL: Duration = Duration::from_millis(10);

/// Types an already complete reply into a fresh assistant entry, one character per tick.
#[derive(Debug, Clone, Copy)]
pub struct RevealAnimator {
    interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// Full text shown, `busy` released and the pending-proof marker attached.
    Completed { entry: EntryId },
    /// A clear moved the log to a newer generation mid-reveal.
    Superseded,
    Cancelled,
}

/// Live reveal. Dropping the handle detaches the timer; [`AnimationHandle::cancel`] stops it.
#[derive(Debug)]
pub struct AnimationHandle {
    entry: EntryId,
    target: Arc<str>,
    cursor: Arc<AtomicUsize>,
    task: JoinHandle<RevealOutcome>,
}

impl Default for RevealAnimator {
    fn default() -> Self {
        Self::new(DEFAULT_REVEAL_INTERVAL)
    }
}

impl RevealAnimator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.clamp(Duration::from_millis(1), MAX_TIMER_PERIOD),
        }
    }

    /// Appends an empty assistant entry and starts typing `reply` into it.
    ///
    /// Returns `None` when `log` already belongs to a cleared generation.
    pub fn start(&self, log: ScopedLog, reply: impl Into<Arc<str>>) -> Option<AnimationHandle> {
        let entry = log.append(Role::Assistant, String::new())?;
        let target: Arc<str> = reply.into();
        let cursor = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn(run_reveal(
            log,
            entry,
            target.clone(),
            cursor.clone(),
            self.interval,
        ));

        Some(AnimationHandle {
            entry,
            target,
            cursor,
            task,
        })
    }
}

impl AnimationHandle {
    pub fn entry(&self) -> EntryId {
        self.entry
    }

    /// Full reply being typed.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Number of characters revealed so far.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }

    pub async fn finished(self) -> RevealOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(error) if error.is_cancelled() => RevealOutcome::Cancelled,
            Err(error) => panic::resume_unwind(error.into_panic()),
        }
    }
}

async fn run_reveal(
    log: ScopedLog,
    entry: EntryId,
    target: Arc<str>,
    cursor: Arc<AtomicUsize>,
    interval: Duration,
) -> RevealOutcome {
    // Byte offset just past each character, so every prefix lands on a char boundary.
    let prefix_ends = target
        .char_indices()
        .map(|(offset, character)| offset + character.len_utf8())
        .collect::<Vec<_>>();

    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut typed = 0usize;

    loop {
        ticker.tick().await;

        let Some(&end) = prefix_ends.get(typed) else {
            if log.finish_reveal(entry) {
                tracing::debug!(entry = entry.0, characters = typed, "reveal completed");
                return RevealOutcome::Completed { entry };
            }
            return RevealOutcome::Superseded;
        };

        let prefix = &target[..end];
        if !log.replace_last(|_| prefix.to_string()) {
            tracing::debug!(
                entry = entry.0,
                generation = log.generation().0,
                "reveal tick dropped for a cleared conversation"
            );
            return RevealOutcome::Superseded;
        }

        typed += 1;
        cursor.store(typed, Ordering::Release);
    }
}
