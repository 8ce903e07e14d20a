//! Cursor-based pagination of older conversation history, decoupled from
//! the live window.
//!
//! Cursor resolution order matters: a retained document handle is exact; a
//! refetch by the last known document id is exact; a bare timestamp can
//! skip or repeat entries when multiple messages share a `createdAt`, so it
//! is the last resort.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::docstore::{Cursor, DocumentStore, PageQuery, RawDocument, StoreError};
use crate::models::Message;

#[derive(Debug)]
pub struct Page {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

pub struct HistoryPaginator {
    store: Arc<dyn DocumentStore>,
    conversation_id: String,
    page_size: usize,
    state: Mutex<PaginatorState>,
}

#[derive(Default)]
struct PaginatorState {
    /// At most one fetch outstanding; a second call while set is a no-op.
    in_flight: bool,
    has_more: bool,
    handle: Option<RawDocument>,
    last_visible_id: Option<String>,
    last_visible_ms: Option<i64>,
}

impl HistoryPaginator {
    pub fn new(store: Arc<dyn DocumentStore>, conversation_id: impl Into<String>, page_size: usize) -> Self {
        Self {
            store,
            conversation_id: conversation_id.into(),
            page_size: page_size.max(1),
            state: Mutex::new(PaginatorState {
                has_more: true,
                ..Default::default()
            }),
        }
    }

    /// Seed the cursor from a restored cache entry or from the oldest
    /// currently loaded message. No document handle exists yet, so the next
    /// fetch resolves through the id-refetch path.
    pub fn seed(&self, last_visible_ms: Option<i64>, last_visible_id: Option<String>) {
        let mut state = self.state.lock();
        state.last_visible_ms = last_visible_ms;
        state.last_visible_id = last_visible_id;
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().has_more
    }

    pub fn is_seeded(&self) -> bool {
        let state = self.state.lock();
        state.handle.is_some() || state.last_visible_id.is_some() || state.last_visible_ms.is_some()
    }

    /// Current resumable cursor position, for persistence.
    pub fn cursor_snapshot(&self) -> (Option<i64>, Option<String>) {
        let state = self.state.lock();
        (state.last_visible_ms, state.last_visible_id.clone())
    }

    /// Fetch the next page of older messages.
    ///
    /// Returns `Ok(None)` when the call is a no-op (a fetch is already in
    /// flight, or history is exhausted). On error the cursor state is left
    /// untouched and `has_more` stays true, so the caller may simply retry.
    pub async fn load_older(&self) -> Result<Option<Page>, StoreError> {
        let (last_visible_id, last_visible_ms, handle) = {
            let mut state = self.state.lock();
            if state.in_flight || !state.has_more {
                return Ok(None);
            }
            state.in_flight = true;
            (
                state.last_visible_id.clone(),
                state.last_visible_ms,
                state.handle.clone(),
            )
        };

        let cursor = self
            .resolve_cursor(handle, last_visible_id, last_visible_ms)
            .await;

        let query = PageQuery {
            conversation_id: self.conversation_id.clone(),
            limit: self.page_size,
            start_after: cursor,
        };

        let docs = match self.store.fetch_page(query).await {
            Ok(docs) => docs,
            Err(err) => {
                self.state.lock().in_flight = false;
                return Err(err);
            }
        };

        let has_more = docs.len() >= self.page_size;
        let messages: Vec<Message> = docs.iter().filter_map(Message::from_document).collect();

        {
            let mut state = self.state.lock();
            state.in_flight = false;
            state.has_more = has_more;
            if let Some(last) = docs.last() {
                state.last_visible_id = Some(last.id.clone());
                state.last_visible_ms = last.created_at_ms();
                state.handle = Some(last.clone());
            }
        }

        Ok(Some(Page { messages, has_more }))
    }

    /// Resolve the best available cursor: retained handle, then refetch by
    /// id, then the timestamp fallback.
    async fn resolve_cursor(
        &self,
        handle: Option<RawDocument>,
        last_visible_id: Option<String>,
        last_visible_ms: Option<i64>,
    ) -> Option<Cursor> {
        if let Some(doc) = handle {
            return Some(Cursor::Handle(doc));
        }
        if let Some(id) = last_visible_id {
            match self.store.fetch_by_id(&self.conversation_id, &id).await {
                Ok(Some(doc)) => return Some(Cursor::Handle(doc)),
                Ok(None) => {
                    tracing::debug!("cursor document {} gone, falling back to timestamp", id);
                }
                Err(err) => {
                    tracing::debug!("cursor refetch for {} failed ({}), falling back to timestamp", id, err);
                }
            }
        }
        last_visible_ms.map(Cursor::TimestampMs)
    }
}
