//! In-memory conversation LRU cache.
//!
//! Process-lifetime cache keyed by conversation id, holding the same entry
//! shape as the persistent store for instant re-entry into recently viewed
//! conversations. Constructed once at startup and passed by reference
//! (never a module-level global) so tests can build their own.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::models::CacheEntry;

pub struct ConversationCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    capacity: usize,
    /// Insertion order, oldest-touched first. `get` and `put` both
    /// remove-then-reinsert the key so it becomes newest. The touch happens
    /// entirely under one lock acquisition; it is never split across an
    /// await point.
    order: Vec<String>,
    entries: HashMap<String, CacheEntry>,
}

impl ConversationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                capacity: capacity.max(1),
                order: Vec::new(),
                entries: HashMap::new(),
            }),
        }
    }

    /// Fetch an entry and mark it most-recently-used.
    pub fn get(&self, conversation_id: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.get(conversation_id).cloned()?;
        inner.touch(conversation_id);
        Some(entry)
    }

    /// Insert or overwrite an entry, evicting the least-recently-used
    /// conversation if capacity is exceeded. Evicted entries are dropped
    /// entirely; the persistent store is written separately.
    pub fn put(&self, conversation_id: &str, entry: CacheEntry) {
        let mut inner = self.inner.lock();
        inner.entries.insert(conversation_id.to_string(), entry);
        inner.touch(conversation_id);
        while inner.entries.len() > inner.capacity {
            let oldest = inner.order.remove(0);
            inner.entries.remove(&oldest);
            tracing::debug!("memory cache evicted conversation {}", oldest);
        }
    }

    /// Drop an entry, e.g. when the conversation is deleted.
    pub fn invalidate(&self, conversation_id: &str) {
        let mut inner = self.inner.lock();
        inner.entries.remove(conversation_id);
        inner.order.retain(|id| id != conversation_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheInner {
    fn touch(&mut self, conversation_id: &str) {
        self.order.retain(|id| id != conversation_id);
        self.order.push(conversation_id.to_string());
    }
}
