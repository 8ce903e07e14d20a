//! Scripted in-memory document store for unit tests.
//!
//! Backs `fetch_page`/`fetch_by_id` with a per-conversation document list,
//! lets tests push snapshot deltas into live subscriptions, records every
//! committed batch, and supports injected failures for both fetches and
//! commits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::json;

use crate::docstore::{
    ChangeKind, Cursor, DocChange, DocumentStore, ListenerHandle, PageQuery, QuerySnapshot,
    RawDocument, SnapshotCallback, StoreError, WriteBatch, WriteOp,
};
use crate::models::Sender;

/// Build a raw message document the way the backend would deliver it.
pub fn msg_doc(id: &str, text: &str, sender: Sender, created_at_ms: i64) -> RawDocument {
    let mut data = json!({
        "text": text,
        "sender": sender.wire_name(),
        "createdAt": created_at_ms,
    });
    if let Sender::Admin { admin_id } = &sender {
        data["adminId"] = json!(admin_id);
    }
    RawDocument::new(id, data)
}

struct Listener {
    id: u64,
    conversation_id: String,
    callback: SnapshotCallback,
}

#[derive(Default)]
struct MockInner {
    /// Per conversation, sorted newest-first (stable for equal timestamps).
    docs: HashMap<String, Vec<RawDocument>>,
    listeners: Vec<Listener>,
    next_listener_id: u64,
    committed: Vec<WriteBatch>,
    fail_fetch: bool,
    fail_commit: bool,
    /// When set, committed message documents are echoed back to live
    /// listeners as `Added` changes, like the real backend would.
    echo_commits: bool,
    /// Artificial latency for page fetches, for interleaving tests.
    fetch_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct MockDocumentStore {
    inner: Arc<Mutex<MockInner>>,
}

impl MockDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conversation_id: &str, doc: RawDocument) {
        let mut inner = self.inner.lock();
        let docs = inner.docs.entry(conversation_id.to_string()).or_default();
        docs.retain(|d| d.id != doc.id);
        docs.push(doc);
        docs.sort_by(|a, b| b.created_at_ms().cmp(&a.created_at_ms()));
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.inner.lock().fail_fetch = fail;
    }

    pub fn fail_commits(&self, fail: bool) {
        self.inner.lock().fail_commit = fail;
    }

    pub fn echo_commits(&self, echo: bool) {
        self.inner.lock().echo_commits = echo;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.inner.lock().fetch_delay = Some(delay);
    }

    pub fn committed_batches(&self) -> Vec<WriteBatch> {
        self.inner.lock().committed.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Deliver a delta snapshot to every listener of a conversation.
    pub fn push_snapshot(&self, conversation_id: &str, changes: Vec<DocChange>) {
        for doc_change in &changes {
            match doc_change.kind {
                ChangeKind::Added | ChangeKind::Modified => {
                    self.insert(conversation_id, doc_change.doc.clone());
                }
                ChangeKind::Removed => {
                    let mut inner = self.inner.lock();
                    if let Some(docs) = inner.docs.get_mut(conversation_id) {
                        docs.retain(|d| d.id != doc_change.doc.id);
                    }
                }
            }
        }
        self.deliver(conversation_id, Ok(QuerySnapshot { changes }));
    }

    /// Terminate all listeners of a conversation with an error.
    pub fn fail_subscription(&self, conversation_id: &str) {
        self.deliver(
            conversation_id,
            Err(StoreError::PermissionDenied("conversation gone".into())),
        );
    }

    fn deliver(&self, conversation_id: &str, result: Result<QuerySnapshot, StoreError>) {
        let callbacks: Vec<SnapshotCallback> = {
            let inner = self.inner.lock();
            inner
                .listeners
                .iter()
                .filter(|l| l.conversation_id == conversation_id)
                .map(|l| l.callback.clone())
                .collect()
        };
        for callback in callbacks {
            callback(result.clone());
        }
    }

    fn page_after(docs: &[RawDocument], cursor: Option<&Cursor>, limit: usize) -> Vec<RawDocument> {
        let start = match cursor {
            None => 0,
            Some(Cursor::Handle(doc)) => match docs.iter().position(|d| d.id == doc.id) {
                Some(pos) => pos + 1,
                // Handle no longer present: degrade to its timestamp.
                None => docs
                    .iter()
                    .position(|d| d.created_at_ms() < doc.created_at_ms())
                    .unwrap_or(docs.len()),
            },
            Some(Cursor::Id(id)) => docs
                .iter()
                .position(|d| &d.id == id)
                .map(|pos| pos + 1)
                .unwrap_or(docs.len()),
            Some(Cursor::TimestampMs(ts)) => docs
                .iter()
                .position(|d| d.created_at_ms().map_or(false, |ms| ms < *ts))
                .unwrap_or(docs.len()),
        };
        docs.iter().skip(start).take(limit).cloned().collect()
    }
}

struct MockListener {
    id: u64,
    inner: Arc<Mutex<MockInner>>,
}

impl ListenerHandle for MockListener {
    fn unsubscribe(&self) {
        self.inner.lock().listeners.retain(|l| l.id != self.id);
    }
}

impl DocumentStore for MockDocumentStore {
    fn fetch_page(&self, query: PageQuery) -> BoxFuture<'static, Result<Vec<RawDocument>, StoreError>> {
        let (result, delay) = {
            let inner = self.inner.lock();
            let result = if inner.fail_fetch {
                Err(StoreError::Unavailable("injected fetch failure".into()))
            } else {
                let docs = inner
                    .docs
                    .get(&query.conversation_id)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                Ok(Self::page_after(docs, query.start_after.as_ref(), query.limit))
            };
            (result, inner.fetch_delay)
        };
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }

    fn fetch_by_id(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> BoxFuture<'static, Result<Option<RawDocument>, StoreError>> {
        let result = {
            let inner = self.inner.lock();
            if inner.fail_fetch {
                Err(StoreError::Unavailable("injected fetch failure".into()))
            } else {
                Ok(inner
                    .docs
                    .get(conversation_id)
                    .and_then(|docs| docs.iter().find(|d| d.id == message_id).cloned()))
            }
        };
        Box::pin(async move { result })
    }

    fn subscribe_latest(
        &self,
        conversation_id: &str,
        limit: usize,
        callback: SnapshotCallback,
    ) -> Box<dyn ListenerHandle> {
        let (id, initial) = {
            let mut inner = self.inner.lock();
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            inner.listeners.push(Listener {
                id,
                conversation_id: conversation_id.to_string(),
                callback: callback.clone(),
            });
            let initial: Vec<DocChange> = inner
                .docs
                .get(conversation_id)
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .take(limit)
                .map(|doc| DocChange {
                    kind: ChangeKind::Added,
                    doc: doc.clone(),
                })
                .collect();
            (id, initial)
        };
        // Initial snapshot is delivered synchronously, like an attached
        // listener receiving the current query results.
        callback(Ok(QuerySnapshot { changes: initial }));
        Box::new(MockListener {
            id,
            inner: self.inner.clone(),
        })
    }

    fn commit(&self, batch: WriteBatch) -> BoxFuture<'static, Result<(), StoreError>> {
        let store = self.clone();
        Box::pin(async move {
            let echoes: Vec<(String, RawDocument, bool)> = {
                let mut inner = store.inner.lock();
                if inner.fail_commit {
                    return Err(StoreError::Unavailable("injected commit failure".into()));
                }
                inner.committed.push(batch.clone());
                let echo = inner.echo_commits;
                let mut writes = Vec::new();
                for op in &batch.ops {
                    if let WriteOp::Set { collection, id, data } = op {
                        if let Some(conversation_id) = collection
                            .strip_prefix("conversations/")
                            .and_then(|rest| rest.strip_suffix("/messages"))
                        {
                            writes.push((
                                conversation_id.to_string(),
                                RawDocument::new(id.clone(), data.clone()),
                                echo,
                            ));
                        }
                    }
                }
                writes
            };
            for (conversation_id, doc, _) in &echoes {
                store.insert(conversation_id, doc.clone());
            }
            for (conversation_id, doc, echo) in echoes {
                if !echo {
                    continue;
                }
                store.deliver(
                    &conversation_id,
                    Ok(QuerySnapshot {
                        changes: vec![DocChange {
                            kind: ChangeKind::Added,
                            doc,
                        }],
                    }),
                );
            }
            Ok(())
        })
    }
}
