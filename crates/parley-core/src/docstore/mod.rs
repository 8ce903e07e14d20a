//! External document-store interface.
//!
//! The sync core talks to the hosted backend exclusively through these
//! traits: a realtime query subscription delivering incremental change
//! lists, cursor-based page fetches, and an atomic batched write with
//! client-chosen document ids (which is what makes optimistic sends
//! idempotent). The concrete transport lives in the embedding app.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

#[cfg(test)]
pub(crate) mod mock;

/// A schemaless document as delivered by the backend.
///
/// `data` carries the raw field map; validation into a typed
/// [`crate::models::Message`] happens at the subscription boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub data: Value,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self { id: id.into(), data }
    }

    /// `createdAt` in milliseconds, if present and numeric.
    pub fn created_at_ms(&self) -> Option<i64> {
        self.data.get("createdAt").and_then(Value::as_i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One entry of a snapshot change list.
#[derive(Debug, Clone)]
pub struct DocChange {
    pub kind: ChangeKind,
    pub doc: RawDocument,
}

/// A realtime snapshot. The first snapshot after subscribing carries the
/// full initial window as `Added` changes; subsequent snapshots carry only
/// the delta.
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
    pub changes: Vec<DocChange>,
}

/// Pagination position marker, in order of preference.
///
/// A retained document handle is exact. An id lets the store refetch the
/// boundary document and resume exactly. A bare timestamp is the fallback
/// and can skip or repeat messages that share a `createdAt`.
#[derive(Debug, Clone)]
pub enum Cursor {
    Handle(RawDocument),
    Id(String),
    TimestampMs(i64),
}

/// Parameters for one older-history page fetch, newest-first.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub conversation_id: String,
    pub limit: usize,
    pub start_after: Option<Cursor>,
}

/// One operation of an atomic write batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Create-or-replace with a client-chosen document id.
    Set {
        collection: String,
        id: String,
        data: Value,
    },
    /// Partial field update on an existing document.
    Update {
        collection: String,
        id: String,
        data: Value,
    },
}

/// Batched atomic write. All operations commit or none do.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, collection: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        self.ops.push(WriteOp::Set {
            collection: collection.into(),
            id: id.into(),
            data,
        });
        self
    }

    pub fn update(
        mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        data: Value,
    ) -> Self {
        self.ops.push(WriteOp::Update {
            collection: collection.into(),
            id: id.into(),
            data,
        });
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Callback invoked for every snapshot of a live subscription.
///
/// An `Err` is terminal for the subscription: the listener will deliver no
/// further snapshots and the conversation should be treated as gone.
pub type SnapshotCallback = Arc<dyn Fn(Result<QuerySnapshot, StoreError>) + Send + Sync>;

/// Handle for an active realtime listener. After `unsubscribe` returns, the
/// callback is never invoked again.
pub trait ListenerHandle: Send {
    fn unsubscribe(&self);
}

/// The backend surface the sync core consumes.
///
/// Methods return boxed futures so the trait stays object-safe and mockable;
/// implementations clone whatever they need out of `&self` before going
/// async.
pub trait DocumentStore: Send + Sync {
    /// Fetch one page of a conversation's messages, newest-first, starting
    /// strictly after `query.start_after` when present.
    fn fetch_page(&self, query: PageQuery) -> BoxFuture<'static, Result<Vec<RawDocument>, StoreError>>;

    /// Refetch a single message document by id, for exact cursor resumption.
    fn fetch_by_id(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> BoxFuture<'static, Result<Option<RawDocument>, StoreError>>;

    /// Open a realtime subscription to the newest `limit` messages of a
    /// conversation, ordered by `createdAt` descending.
    fn subscribe_latest(
        &self,
        conversation_id: &str,
        limit: usize,
        callback: SnapshotCallback,
    ) -> Box<dyn ListenerHandle>;

    /// Atomically commit a write batch.
    fn commit(&self, batch: WriteBatch) -> BoxFuture<'static, Result<(), StoreError>>;
}

/// Collection path for a conversation's messages.
pub fn messages_collection(conversation_id: &str) -> String {
    format!("conversations/{conversation_id}/messages")
}

/// Collection holding conversation summary documents.
pub const CONVERSATIONS_COLLECTION: &str = "conversations";
