//! The conversation store.
//!
//! Holds at most one suspended conversation per [`SessionKey`]. Entries are
//! plain data: the conversation kind, its serialized state, the frame it is
//! waiting on and the time of the last activity. Nothing in an entry refers
//! to live code, so the whole store can be snapshotted to JSON and restored
//! in another process.
//!
//! The store itself only guarantees atomic access per key. Serializing the
//! read-modify-write of one session is the dispatcher's job.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::conversation::Frame;
use parley_core::SessionKey;

/// Current unix time in milliseconds.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

/// One suspended conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConversation {
    kind: String,
    state: Value,
    frame: Frame,
    last_activity: i64,
}

impl StoredConversation {
    pub(crate) fn new(kind: impl Into<String>, state: Value, frame: Frame) -> Self {
        Self {
            kind: kind.into(),
            state,
            frame,
            last_activity: now_ms(),
        }
    }

    /// The registered name of the conversation type.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The serialized conversation value.
    pub fn state(&self) -> &Value {
        &self.state
    }

    /// The frame awaiting an answer.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Unix time in milliseconds of the last put or touch.
    pub fn last_activity(&self) -> i64 {
        self.last_activity
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    session: SessionKey,
    conversation: StoredConversation,
}

/// Process-wide map from session to suspended conversation.
#[derive(Debug, Default)]
pub struct ConversationStore {
    entries: DashMap<SessionKey, StoredConversation>,
}

impl ConversationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the entry for `session`.
    pub fn get(&self, session: &SessionKey) -> Option<StoredConversation> {
        self.entries.get(session).map(|e| e.value().clone())
    }

    /// Stores `conversation` for `session`, replacing any previous entry.
    ///
    /// The entry's activity time is set to now.
    pub fn put(&self, session: SessionKey, mut conversation: StoredConversation) {
        conversation.last_activity = now_ms();
        self.entries.insert(session, conversation);
    }

    /// Refreshes the activity time of `session`'s entry.
    pub fn touch(&self, session: &SessionKey) {
        if let Some(mut entry) = self.entries.get_mut(session) {
            entry.last_activity = now_ms();
        }
    }

    /// Removes and returns the entry for `session`.
    pub fn remove(&self, session: &SessionKey) -> Option<StoredConversation> {
        self.entries.remove(session).map(|(_, c)| c)
    }

    /// Returns `true` if `session` has a suspended conversation.
    pub fn contains(&self, session: &SessionKey) -> bool {
        self.entries.contains_key(session)
    }

    /// Number of suspended conversations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no conversation is suspended.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sessions with a suspended conversation, sorted.
    pub fn sessions(&self) -> Vec<SessionKey> {
        let mut sessions: Vec<_> = self.entries.iter().map(|e| e.key().clone()).collect();
        sessions.sort();
        sessions
    }

    /// Removes every entry idle for longer than `max_idle`.
    ///
    /// Returns the number of removed entries.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        self.sweep_idle_at(now_ms(), max_idle)
    }

    pub(crate) fn sweep_idle_at(&self, now: i64, max_idle: Duration) -> usize {
        let max_idle = i64::try_from(max_idle.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(max_idle);
        let before = self.entries.len();
        self.entries.retain(|_, c| c.last_activity >= cutoff);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Swept idle conversations");
        }
        removed
    }

    /// Serializes every entry.
    ///
    /// # Errors
    ///
    /// Fails only if a stored value cannot be represented as JSON.
    pub fn snapshot(&self) -> serde_json::Result<Value> {
        let mut entries: Vec<SnapshotEntry> = self
            .entries
            .iter()
            .map(|e| SnapshotEntry {
                session: e.key().clone(),
                conversation: e.value().clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.session.cmp(&b.session));
        serde_json::to_value(entries)
    }

    /// Loads entries produced by [`snapshot`](Self::snapshot).
    ///
    /// Restored entries replace existing ones for the same session; activity
    /// times are kept as recorded. Returns the number of restored entries.
    ///
    /// # Errors
    ///
    /// Fails without modifying the store if `snapshot` is malformed.
    pub fn restore(&self, snapshot: Value) -> serde_json::Result<usize> {
        let entries: Vec<SnapshotEntry> = serde_json::from_value(snapshot)?;
        let count = entries.len();
        for entry in entries {
            self.entries.insert(entry.session, entry.conversation);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Ask;
    use parley_core::Category;
    use serde_json::json;

    fn frame() -> Frame {
        let mut turn: crate::conversation::Turn<String> = crate::conversation::Turn::new(
            SessionKey::new("u", "c"),
            crate::conversation::StepMode::Start,
            None,
        );
        turn.ask(Ask::new("Q?").on(Category::Image, "image".to_string()))
            .unwrap();
        match turn.finish().1 {
            crate::conversation::Next::Suspend(f) => f,
            crate::conversation::Next::End => unreachable!(),
        }
    }

    fn entry() -> StoredConversation {
        StoredConversation::new("demo", json!({ "count": 1 }), frame())
    }

    #[test]
    fn put_get_remove() {
        let store = ConversationStore::new();
        let key = SessionKey::new("u", "c");
        assert!(store.get(&key).is_none());

        store.put(key.clone(), entry());
        assert!(store.contains(&key));
        assert_eq!(store.get(&key).unwrap().kind(), "demo");

        assert!(store.remove(&key).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn keys_are_per_sender_and_channel() {
        let store = ConversationStore::new();
        store.put(SessionKey::new("u", "a"), entry());
        assert!(!store.contains(&SessionKey::new("u", "b")));
        assert!(!store.contains(&SessionKey::new("v", "a")));
    }

    #[test]
    fn put_replaces_existing_entry() {
        let store = ConversationStore::new();
        let key = SessionKey::new("u", "c");
        store.put(key.clone(), entry());
        store.put(
            key.clone(),
            StoredConversation::new("other", json!(null), frame()),
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).unwrap().kind(), "other");
    }

    #[test]
    fn sweep_removes_only_idle_entries() {
        let store = ConversationStore::new();
        store.put(SessionKey::new("old", "c"), entry());
        store.put(SessionKey::new("new", "c"), entry());
        store
            .entries
            .get_mut(&SessionKey::new("old", "c"))
            .unwrap()
            .last_activity -= 120_000;

        let removed = store.sweep_idle_at(now_ms(), Duration::from_secs(60));
        assert_eq!(removed, 1);
        assert_eq!(store.sessions(), vec![SessionKey::new("new", "c")]);
    }

    #[test]
    fn huge_idle_timeout_keeps_everything() {
        let store = ConversationStore::new();
        store.put(SessionKey::new("u", "c"), entry());

        assert_eq!(store.sweep_idle(Duration::from_secs(u64::MAX)), 0);
        assert_eq!(store.sweep_idle(Duration::from_millis(i64::MAX as u64 + 1)), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn snapshot_restores_into_new_store() {
        let store = ConversationStore::new();
        store.put(SessionKey::new("a", "c"), entry());
        store.put(SessionKey::new("b", "c"), entry());
        let snapshot = store.snapshot().unwrap();

        let restored = ConversationStore::new();
        assert_eq!(restored.restore(snapshot).unwrap(), 2);
        assert_eq!(
            restored.get(&SessionKey::new("a", "c")),
            store.get(&SessionKey::new("a", "c"))
        );
    }

    #[test]
    fn malformed_snapshot_is_rejected() {
        let store = ConversationStore::new();
        assert!(store.restore(json!({ "not": "a list" })).is_err());
        assert!(store.is_empty());
    }
}
