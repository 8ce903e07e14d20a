//! Persistent recent-message store.
//!
//! Durable per-conversation cache entry holding the most recent messages
//! plus the pagination cursor, serialized as JSON onto a string-only
//! key-value primitive. This store is an optimization, never a source of
//! truth: every read/write failure is logged and swallowed, and a missing
//! entry must never block the live subscription.
//!
//! # Cache invalidation
//! An entry is treated as a miss when:
//! - `CACHE_SCHEMA_VERSION` does not match (code change altered the types)
//! - the payload is corrupt
//! - the entry is older than `MAX_CACHE_AGE_MS`

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::{CACHE_SCHEMA_VERSION, MAX_CACHE_AGE_MS};
use crate::models::{now_ms, CacheEntry, Delivery};
use crate::store::KeyValueStore;

/// Versioned envelope wrapping the persisted cache entry.
#[derive(Serialize, Deserialize)]
struct CacheEnvelope {
    schema_version: u32,
    saved_at_ms: i64,
    entry: CacheEntry,
}

#[derive(Clone)]
pub struct RecentMessageStore {
    kv: Arc<dyn KeyValueStore>,
}

fn storage_key(conversation_id: &str) -> String {
    format!("parley:recent:{conversation_id}")
}

impl RecentMessageStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Load the cached entry for a conversation, or `None` on miss.
    ///
    /// Pending messages restored from disk are demoted to failed: a write
    /// issued by a dead process can never confirm, and failed exposes the
    /// retry affordance.
    pub fn load(&self, conversation_id: &str) -> Option<CacheEntry> {
        let raw = match self.kv.get_item(&storage_key(conversation_id)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!("recent cache read failed for {}: {:#}", conversation_id, err);
                return None;
            }
        };

        let envelope: CacheEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!("recent cache corrupt for {}: {}", conversation_id, err);
                return None;
            }
        };

        if envelope.schema_version != CACHE_SCHEMA_VERSION {
            tracing::info!(
                "recent cache schema mismatch for {} (cached={} current={}), discarding",
                conversation_id,
                envelope.schema_version,
                CACHE_SCHEMA_VERSION
            );
            return None;
        }

        if now_ms().saturating_sub(envelope.saved_at_ms) > MAX_CACHE_AGE_MS {
            tracing::info!("recent cache for {} too old, discarding", conversation_id);
            return None;
        }

        let mut entry = envelope.entry;
        for message in &mut entry.messages {
            if message.delivery == Delivery::Pending {
                message.delivery = Delivery::Failed;
            }
        }
        Some(entry)
    }

    /// Persist an entry. Fire-and-forget: failures are logged and swallowed.
    /// Callers debounce this to avoid write amplification.
    pub fn save(&self, conversation_id: &str, entry: &CacheEntry) {
        let envelope = CacheEnvelope {
            schema_version: CACHE_SCHEMA_VERSION,
            saved_at_ms: now_ms(),
            entry: entry.clone(),
        };
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!("recent cache serialize failed for {}: {}", conversation_id, err);
                return;
            }
        };
        if let Err(err) = self.kv.set_item(&storage_key(conversation_id), &raw) {
            tracing::warn!("recent cache write failed for {}: {:#}", conversation_id, err);
        }
    }

    /// Drop the entry, e.g. when the conversation itself is deleted.
    pub fn invalidate(&self, conversation_id: &str) {
        if let Err(err) = self.kv.remove_item(&storage_key(conversation_id)) {
            tracing::warn!("recent cache invalidate failed for {}: {:#}", conversation_id, err);
        }
    }
}
