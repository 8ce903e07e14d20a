use serde::{Deserialize, Serialize};

use crate::models::{now_ms, Message};

/// Per-conversation cache payload shared by the in-memory LRU and the
/// persistent store: the most recent messages plus the pagination cursor
/// needed to resume older-history fetches after a restart.
///
/// Invariants: `messages` is newest-first, contains no duplicate ids, and
/// is capped by the caller's configured limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Most-recent-first, length-capped.
    pub messages: Vec<Message>,
    /// Timestamp cursor for pagination continuation.
    #[serde(default)]
    pub last_visible_ms: Option<i64>,
    /// Id of the last-paginated document; preferred over the timestamp
    /// cursor, which can collide.
    #[serde(default)]
    pub last_visible_id: Option<String>,
    /// Cache write time, drives LRU ordering.
    pub updated_at_ms: i64,
}

impl CacheEntry {
    /// Build an entry from an already-merged newest-first sequence,
    /// capping to `limit` and stamping the write time.
    pub fn capped(messages: &[Message], limit: usize) -> Self {
        Self {
            messages: messages.iter().take(limit).cloned().collect(),
            last_visible_ms: None,
            last_visible_id: None,
            updated_at_ms: now_ms(),
        }
    }

    pub fn with_cursor(mut self, last_visible_ms: Option<i64>, last_visible_id: Option<String>) -> Self {
        self.last_visible_ms = last_visible_ms;
        self.last_visible_id = last_visible_id;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
