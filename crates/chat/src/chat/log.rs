use std::sync::Arc;

use tokio::sync::watch;

use super::error::SubmitRejection;
use super::message::{
    ConversationSnapshot, EntryId, Generation, Role, TimelineEntry, with_pending_proof,
};

/// Ordered conversation log shared by the controller, its timers and the view.
///
/// The snapshot lives inside a watch channel: every write runs under the channel lock,
/// so a mutation always sees the latest state and subscribers are notified once per write.
#[derive(Debug, Clone)]
pub struct MessageLog {
    state: Arc<watch::Sender<ConversationSnapshot>>,
}

/// What the send task needs after a submission was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AcceptedSend {
    pub generation: Generation,
    pub user_entry: EntryId,
    pub history: Vec<TimelineEntry>,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConversationSnapshot::default());
        Self {
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.state.borrow().clone()
    }

    pub fn generation(&self) -> Generation {
        self.state.borrow().generation
    }

    pub fn append(&self, role: Role, content: impl Into<String>) -> EntryId {
        let content = content.into();
        self.mutate(|snapshot| Some(push_entry(snapshot, role, content)))
            .unwrap_or(EntryId::new(0))
    }

    /// Rewrites the content of the last entry. Returns false when the log is empty.
    pub fn replace_last(&self, mutator: impl FnOnce(&str) -> String) -> bool {
        self.mutate(|snapshot| {
            let entry = snapshot.entries.last_mut()?;
            entry.content = mutator(&entry.content);
            Some(())
        })
        .is_some()
    }

    pub fn reset(&self) {
        self.mutate(|snapshot| {
            snapshot.entries.clear();
            Some(())
        });
    }

    /// Binds writes to `generation`; they become no-ops once a clear moves past it.
    pub fn scoped(&self, generation: Generation) -> ScopedLog {
        ScopedLog {
            log: self.clone(),
            generation,
        }
    }

    pub(crate) fn begin_send(&self, input: &str) -> Result<AcceptedSend, SubmitRejection> {
        let mut rejection = None;
        let accepted = self.mutate(|snapshot| {
            if snapshot.dissolving {
                rejection = Some(SubmitRejection::Dissolving);
                return None;
            }
            if snapshot.busy {
                rejection = Some(SubmitRejection::Busy);
                return None;
            }

            snapshot.busy = true;
            let user_entry = push_entry(snapshot, Role::User, input.to_string());
            Some(AcceptedSend {
                generation: snapshot.generation,
                user_entry,
                history: snapshot.entries.clone(),
            })
        });

        accepted.ok_or(rejection.unwrap_or(SubmitRejection::Busy))
    }

    /// Starts a new generation and marks the log as dissolving.
    pub(crate) fn begin_clear(&self) -> Generation {
        self.mutate(|snapshot| {
            snapshot.generation = snapshot.generation.next();
            snapshot.dissolving = true;
            Some(snapshot.generation)
        })
        .unwrap_or_default()
    }

    /// Empties the log unless a later clear already took over.
    pub(crate) fn finish_clear(&self, generation: Generation) -> bool {
        self.mutate(|snapshot| {
            if snapshot.generation != generation {
                return None;
            }
            snapshot.entries.clear();
            snapshot.busy = false;
            snapshot.dissolving = false;
            Some(())
        })
        .is_some()
    }

    fn mutate<R>(
        &self,
        mutation: impl FnOnce(&mut ConversationSnapshot) -> Option<R>,
    ) -> Option<R> {
        let mut outcome = None;
        self.state.send_if_modified(|snapshot| {
            outcome = mutation(snapshot);
            if outcome.is_some() {
                snapshot.revision = snapshot.revision.wrapping_add(1);
            }
            outcome.is_some()
        });
        outcome
    }
}

fn push_entry(snapshot: &mut ConversationSnapshot, role: Role, content: String) -> EntryId {
    let id = snapshot.alloc_entry_id();
    snapshot.entries.push(TimelineEntry::new(id, role, content));
    id
}

/// Log writer captured by timer tasks.
///
/// Each write checks the generation under the same lock that applies it, so a tick
/// that was already queued when a clear ran cannot touch the fresh conversation.
#[derive(Debug, Clone)]
pub struct ScopedLog {
    log: MessageLog,
    generation: Generation,
}

impl ScopedLog {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.log.generation() == self.generation
    }

    pub fn append(&self, role: Role, content: impl Into<String>) -> Option<EntryId> {
        let content = content.into();
        self.guarded(|snapshot| Some(push_entry(snapshot, role, content)))
    }

    pub fn replace_last(&self, mutator: impl FnOnce(&str) -> String) -> bool {
        self.guarded(|snapshot| {
            let entry = snapshot.entries.last_mut()?;
            entry.content = mutator(&entry.content);
            Some(())
        })
        .is_some()
    }

    pub fn replace_entry(&self, id: EntryId, mutator: impl FnOnce(&str) -> String) -> bool {
        self.guarded(|snapshot| {
            let entry = snapshot.entries.iter_mut().find(|entry| entry.id == id)?;
            entry.content = mutator(&entry.content);
            Some(())
        })
        .is_some()
    }

    /// Releases `busy` and attaches the pending-proof marker in one write.
    pub(crate) fn finish_reveal(&self, entry: EntryId) -> bool {
        self.guarded(|snapshot| {
            snapshot.busy = false;
            if let Some(revealed) = snapshot.entries.iter_mut().find(|item| item.id == entry) {
                revealed.content = with_pending_proof(&revealed.content);
            }
            Some(())
        })
        .is_some()
    }

    /// Appends a visible error entry and releases `busy` in one write.
    pub(crate) fn fail_send(&self, notice: &str) -> Option<EntryId> {
        self.guarded(|snapshot| {
            snapshot.busy = false;
            Some(push_entry(snapshot, Role::Assistant, notice.to_string()))
        })
    }

    fn guarded<R>(
        &self,
        mutation: impl FnOnce(&mut ConversationSnapshot) -> Option<R>,
    ) -> Option<R> {
        let generation = self.generation;
        self.log.mutate(|snapshot| {
            if snapshot.generation != generation {
                return None;
            }
            mutation(snapshot)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_entries_read_back_unchanged() {
        let log = MessageLog::new();
        let id = log.append(Role::User, "  hello *world*  ");

        let snapshot = log.snapshot();
        assert_eq!(snapshot.entries.len(), 1);
        let entry = snapshot.entry(id).unwrap();
        assert_eq!(entry.role, Role::User);
        assert_eq!(entry.content, "  hello *world*  ");
    }

    #[test]
    fn replace_last_only_touches_the_tail() {
        let log = MessageLog::new();
        let first = log.append(Role::User, "question");
        log.append(Role::Assistant, "");

        assert!(log.replace_last(|content| format!("{content}answer")));

        let snapshot = log.snapshot();
        assert_eq!(snapshot.entry(first).unwrap().content, "question");
        assert_eq!(snapshot.last().unwrap().content, "answer");
    }

    #[test]
    fn replace_last_on_empty_log_does_not_notify() {
        let log = MessageLog::new();
        let receiver = log.subscribe();

        assert!(!log.replace_last(|_| "ghost".to_string()));
        assert!(!receiver.has_changed().unwrap());
        assert_eq!(log.snapshot().revision, 0);
    }

    #[test]
    fn every_mutation_bumps_revision_and_notifies() {
        let log = MessageLog::new();
        let mut receiver = log.subscribe();

        log.append(Role::User, "a");
        assert!(receiver.has_changed().unwrap());
        receiver.borrow_and_update();

        log.reset();
        assert!(receiver.has_changed().unwrap());
        assert_eq!(log.snapshot().revision, 2);
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn entry_ids_survive_reset() {
        let log = MessageLog::new();
        let before = log.append(Role::User, "a");
        log.reset();
        let after = log.append(Role::User, "b");
        assert!(after > before);
    }

    #[test]
    fn begin_send_refuses_while_busy() {
        let log = MessageLog::new();
        let accepted = log.begin_send("first").unwrap();
        assert_eq!(accepted.history.len(), 1);
        assert!(log.snapshot().busy);

        assert_eq!(log.begin_send("second"), Err(SubmitRejection::Busy));
        assert_eq!(log.snapshot().entries.len(), 1);
    }

    #[test]
    fn stale_scope_cannot_write_after_clear() {
        let log = MessageLog::new();
        let accepted = log.begin_send("hello").unwrap();
        let scoped = log.scoped(accepted.generation);

        let cleared = log.begin_clear();
        assert_eq!(log.begin_send("during dissolve"), Err(SubmitRejection::Dissolving));
        assert!(log.finish_clear(cleared));

        assert!(!scoped.is_current());
        assert!(scoped.append(Role::Assistant, "late").is_none());
        assert!(!scoped.replace_last(|_| "late".to_string()));

        let snapshot = log.snapshot();
        assert!(snapshot.is_empty());
        assert!(!snapshot.busy);
        assert!(!snapshot.dissolving);
    }

    #[test]
    fn superseded_clear_leaves_reset_to_the_latest() {
        let log = MessageLog::new();
        let first = log.begin_clear();
        let second = log.begin_clear();

        assert!(!log.finish_clear(first));
        assert!(log.snapshot().dissolving);
        assert!(log.finish_clear(second));
        assert!(!log.snapshot().dissolving);
    }

    #[test]
    fn failed_send_releases_busy() {
        let log = MessageLog::new();
        let accepted = log.begin_send("hello").unwrap();
        let scoped = log.scoped(accepted.generation);

        let notice = scoped.fail_send("❌ Error contacting backend.").unwrap();
        let snapshot = log.snapshot();
        assert!(!snapshot.busy);
        assert!(snapshot.entry(notice).unwrap().is_error());
    }
}
