pub use cryptai_relay::Role;

/// Placeholder shown under a revealed reply until its proof resolves.
pub const PROOF_PENDING: &str = "⏳ Proof pending…";
pub const PROOF_FAILED_NOTICE: &str = "⚠️ Proof failed. Try again later.";
pub const PROOF_UNKNOWN_NOTICE: &str = "⚠️ Proof status unknown. Check later.";
pub const BACKEND_ERROR_NOTICE: &str = "❌ Error contacting backend.";
pub const NO_RESPONSE_NOTICE: &str = "⚠️ No response.";
const ERROR_MARKER: &str = "❌";

/// Stable identifier for one timeline entry.
///
/// Allocated by the log and never reused, including across resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub u64);

impl EntryId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Conversation generation; every clear starts a new one.
///
/// Work scheduled under an older generation must not touch the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(pub u64);

impl Generation {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub id: EntryId,
    pub role: Role,
    pub content: String,
}

impl TimelineEntry {
    pub fn new(id: EntryId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.role == Role::Assistant && self.content.starts_with(ERROR_MARKER)
    }

    /// Assistant entry that has not received its first character yet.
    pub fn is_typing(&self) -> bool {
        self.role == Role::Assistant && self.content.is_empty()
    }

    pub fn has_pending_proof(&self) -> bool {
        self.content.ends_with(PROOF_PENDING)
    }
}

/// Read-only state handed to views. Cloned out of the log on every read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversationSnapshot {
    pub entries: Vec<TimelineEntry>,
    pub busy: bool,
    pub dissolving: bool,
    pub generation: Generation,
    /// Bumped on every mutation so views can cheaply detect changes.
    pub revision: u64,
    pub(crate) last_entry_id: u64,
}

impl ConversationSnapshot {
    pub fn last(&self) -> Option<&TimelineEntry> {
        self.entries.last()
    }

    pub fn entry(&self, id: EntryId) -> Option<&TimelineEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn alloc_entry_id(&mut self) -> EntryId {
        self.last_entry_id = self.last_entry_id.saturating_add(1);
        EntryId::new(self.last_entry_id)
    }
}

/// Appends the pending-proof paragraph to revealed content.
pub fn with_pending_proof(content: &str) -> String {
    format!("{content}\n\n{PROOF_PENDING}")
}

/// Replaces the trailing pending-proof marker, leaving any earlier occurrence untouched.
///
/// Returns `None` when the content carries no marker.
pub fn settle_pending_proof(content: &str, replacement: &str) -> Option<String> {
    let start = content.rfind(PROOF_PENDING)?;
    let mut settled = String::with_capacity(content.len() + replacement.len());
    settled.push_str(&content[..start]);
    settled.push_str(replacement);
    settled.push_str(&content[start + PROOF_PENDING.len()..]);
    Some(settled)
}

pub fn proof_link(url: &str) -> String {
    format!("[🔗 View proof on Polygonscan]({url})")
}
