//! Conversation session: wires the caches, the live subscription, the
//! paginator, and the optimistic outbox into one merged transcript.
//!
//! Startup flow on attach: in-memory cache (instant) → persistent cache
//! (near-instant) → live subscription (authoritative). The merge engine
//! reconciles all three on every change; pagination extends backward on
//! demand; send/retry injects and repairs entries that flow through the
//! same merge.
//!
//! Every async completion is keyed on the epoch captured when the work
//! started. Switching conversations bumps the epoch, so stale callbacks
//! from a previous conversation can never mutate the new one's state.
//!
//! Sessions must be driven from within a tokio runtime: sends and the
//! debounced cache saver spawn tasks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::CoreConfig;
use crate::debounce::Debouncer;
use crate::docstore::{ChangeKind, DocumentStore, ListenerHandle, QuerySnapshot, SnapshotCallback, StoreError};
use crate::events::SessionEvent;
use crate::models::{CacheEntry, Delivery, Message, Sender};
use crate::store::{ConversationCache, RecentMessageStore};
use crate::sync::live_window::{LiveWindow, WindowDelta};
use crate::sync::merge;
use crate::sync::outbox;
use crate::sync::paginator::HistoryPaginator;
use crate::sync::visual::{self, VisualAnnotation};

/// Consumer-reported scroll position, used to decide whether an incoming
/// merge should preserve the reader's offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrollState {
    pub offset_px: f32,
    pub dragging: bool,
}

struct SessionState {
    conversation_id: Option<String>,
    window: LiveWindow,
    paginator: Option<Arc<HistoryPaginator>>,
    listener: Option<Box<dyn ListenerHandle>>,
    loading: bool,
    scroll: ScrollState,
}

struct SessionInner {
    config: CoreConfig,
    store: Arc<dyn DocumentStore>,
    memory: Arc<ConversationCache>,
    recent: RecentMessageStore,
    local_sender: Sender,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Bumped on every attach/detach; async completions compare their
    /// captured value and discard themselves when stale.
    epoch: AtomicU64,
    saver: Debouncer,
    state: Mutex<SessionState>,
}

pub struct ConversationSession {
    inner: Arc<SessionInner>,
}

impl ConversationSession {
    /// Build a session. `local_sender` identifies who outgoing messages are
    /// attributed to (the operator, for an admin console).
    pub fn new(
        store: Arc<dyn DocumentStore>,
        memory: Arc<ConversationCache>,
        recent: RecentMessageStore,
        local_sender: Sender,
        config: CoreConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let live_limit = config.live_limit;
        let saver = Debouncer::new(config.save_debounce);
        let inner = Arc::new(SessionInner {
            config,
            store,
            memory,
            recent,
            local_sender,
            events,
            epoch: AtomicU64::new(0),
            saver,
            state: Mutex::new(SessionState {
                conversation_id: None,
                window: LiveWindow::new(live_limit),
                paginator: None,
                listener: None,
                loading: false,
                scroll: ScrollState::default(),
            }),
        });
        (Self { inner }, receiver)
    }

    /// Switch to a conversation: tear down the previous subscription and
    /// volatile buffers, preload from caches, then open the live
    /// subscription.
    pub fn attach(&self, conversation_id: &str) {
        let inner = &self.inner;
        let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        inner.saver.cancel();

        // Release the previous listener before wiring the new conversation.
        let previous = inner.state.lock().listener.take();
        if let Some(listener) = previous {
            listener.unsubscribe();
        }

        let paginator = Arc::new(HistoryPaginator::new(
            inner.store.clone(),
            conversation_id,
            inner.config.page_size,
        ));

        // A restored pending message has no write task tracking it in this
        // window; demote it so the retry affordance shows. A late echo from
        // a write that did land still confirms it by id.
        let cached = inner
            .memory
            .get(conversation_id)
            .or_else(|| inner.recent.load(conversation_id))
            .map(|mut entry| {
                for message in &mut entry.messages {
                    if message.pending() {
                        message.delivery = Delivery::Failed;
                    }
                }
                entry
            });
        if let Some(entry) = &cached {
            paginator.seed(entry.last_visible_ms, entry.last_visible_id.clone());
        }
        let loading = cached.is_none();

        {
            let mut state = inner.state.lock();
            state.conversation_id = Some(conversation_id.to_string());
            state.window = LiveWindow::new(inner.config.live_limit);
            state.paginator = Some(paginator);
            state.scroll = ScrollState::default();
            state.loading = loading;
            if let Some(entry) = &cached {
                state.window.preload(&entry.messages);
            }
        }
        inner.emit(SessionEvent::LoadingChanged { loading });
        if cached.is_some() {
            inner.emit(SessionEvent::MessagesChanged {
                preserve_scroll: false,
            });
        }

        let weak = Arc::downgrade(inner);
        let callback_conversation = conversation_id.to_string();
        let callback: SnapshotCallback = Arc::new(move |result| {
            let Some(inner) = weak.upgrade() else { return };
            if inner.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            match result {
                Ok(snapshot) => {
                    SessionInner::apply_snapshot(&inner, &callback_conversation, snapshot)
                }
                Err(err) => {
                    tracing::warn!("subscription for {} failed: {}", callback_conversation, err);
                    inner.emit(SessionEvent::ConversationGone {
                        conversation_id: callback_conversation.clone(),
                    });
                }
            }
        });

        let listener =
            inner
                .store
                .subscribe_latest(conversation_id, inner.config.live_limit, callback);
        if inner.epoch.load(Ordering::SeqCst) == epoch {
            let stale = {
                let mut state = inner.state.lock();
                state.listener.replace(listener)
            };
            if let Some(stale) = stale {
                stale.unsubscribe();
            }
        } else {
            // Another attach raced us while subscribing.
            listener.unsubscribe();
        }
    }

    /// Tear down the active conversation, persisting its cache entry
    /// immediately (no debounce: the screen is going away).
    pub fn detach(&self) {
        let inner = &self.inner;
        inner.epoch.fetch_add(1, Ordering::SeqCst);
        inner.saver.cancel();

        let (listener, conversation_id, entry) = {
            let mut state = inner.state.lock();
            let listener = state.listener.take();
            let conversation_id = state.conversation_id.take();
            let entry = conversation_id
                .is_some()
                .then(|| SessionInner::snapshot_entry(&state, &inner.config));
            state.window = LiveWindow::new(inner.config.live_limit);
            state.paginator = None;
            state.loading = false;
            state.scroll = ScrollState::default();
            (listener, conversation_id, entry)
        };
        if let Some(listener) = listener {
            listener.unsubscribe();
        }
        if let (Some(conversation_id), Some(entry)) = (conversation_id, entry) {
            if !entry.is_empty() {
                inner.memory.put(&conversation_id, entry.clone());
                inner.recent.save(&conversation_id, &entry);
            }
        }
    }

    /// Drop all cached state for a deleted conversation. If it is the
    /// active one, the session is torn down without persisting.
    pub fn invalidate_conversation(&self, conversation_id: &str) {
        let inner = &self.inner;
        inner.memory.invalidate(conversation_id);
        inner.recent.invalidate(conversation_id);

        let is_active =
            inner.state.lock().conversation_id.as_deref() == Some(conversation_id);
        if !is_active {
            return;
        }
        inner.epoch.fetch_add(1, Ordering::SeqCst);
        inner.saver.cancel();
        let listener = {
            let mut state = inner.state.lock();
            state.conversation_id = None;
            state.paginator = None;
            state.loading = false;
            state.window = LiveWindow::new(inner.config.live_limit);
            state.listener.take()
        };
        if let Some(listener) = listener {
            listener.unsubscribe();
        }
    }

    /// The canonical merged, sorted, deduplicated transcript, newest-first.
    pub fn combined_messages(&self) -> Vec<Message> {
        let state = self.inner.state.lock();
        merge::combine(state.window.window(), state.window.older())
    }

    /// Grouping/separator annotations, index-aligned with
    /// [`Self::combined_messages`].
    pub fn visual_data(&self) -> Vec<VisualAnnotation> {
        let combined = self.combined_messages();
        visual::annotate(
            &combined,
            self.inner.config.group_window_ms,
            self.inner.config.separator_gap_ms,
        )
    }

    /// True until first data (cache or live snapshot) resolves.
    pub fn messages_loading(&self) -> bool {
        self.inner.state.lock().loading
    }

    pub fn has_more_older(&self) -> bool {
        self.inner
            .state
            .lock()
            .paginator
            .as_ref()
            .map(|p| p.has_more())
            .unwrap_or(false)
    }

    pub fn set_scroll_state(&self, offset_px: f32, dragging: bool) {
        self.inner.state.lock().scroll = ScrollState {
            offset_px,
            dragging,
        };
    }

    /// Optimistically send a message: it appears immediately as pending and
    /// is confirmed by the subscription echo or flipped to failed.
    pub fn send(&self, text: &str) {
        let inner = &self.inner;
        let Some(conversation_id) = inner.state.lock().conversation_id.clone() else {
            return;
        };
        let message = outbox::make_pending_message(text, inner.local_sender.clone());
        inner
            .state
            .lock()
            .window
            .inject_pending(message.clone());
        inner.emit(SessionEvent::MessagesChanged {
            preserve_scroll: false,
        });
        SessionInner::refresh_caches(inner, &conversation_id);
        SessionInner::spawn_write(inner, conversation_id, message);
    }

    /// Re-issue the write for a failed message, reusing its client id so a
    /// duplicate is impossible.
    pub fn retry(&self, message_id: &str) {
        let inner = &self.inner;
        let (conversation_id, message) = {
            let mut state = inner.state.lock();
            let Some(conversation_id) = state.conversation_id.clone() else {
                return;
            };
            let Some(found) = state.window.find(message_id) else {
                return;
            };
            if !found.failed() {
                return;
            }
            let mut message = found.clone();
            message.delivery = Delivery::Pending;
            state.window.set_delivery(message_id, Delivery::Pending);
            (conversation_id, message)
        };
        inner.emit(SessionEvent::MessagesChanged {
            preserve_scroll: false,
        });
        SessionInner::refresh_caches(inner, &conversation_id);
        SessionInner::spawn_write(inner, conversation_id, message);
    }

    /// Fetch one page of older history into the older buffer.
    ///
    /// Errors are recoverable: state is untouched, `has_more_older` stays
    /// true, and the caller may simply invoke this again.
    pub async fn load_older_messages(&self) -> Result<(), StoreError> {
        let inner = &self.inner;
        let epoch = inner.epoch.load(Ordering::SeqCst);
        let (conversation_id, paginator) = {
            let state = inner.state.lock();
            match (state.conversation_id.clone(), state.paginator.clone()) {
                (Some(conversation_id), Some(paginator)) => (conversation_id, paginator),
                _ => return Ok(()),
            }
        };

        let page = paginator.load_older().await?;
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            // Conversation switched while the fetch was in flight.
            return Ok(());
        }
        let Some(page) = page else { return Ok(()) };

        let preserve_scroll = {
            let mut state = inner.state.lock();
            if state.conversation_id.as_deref() != Some(conversation_id.as_str()) {
                return Ok(());
            }
            state.window.extend_older(page.messages);
            state.scroll.offset_px > inner.config.scroll_anchor_px && !state.scroll.dragging
        };
        inner.emit(SessionEvent::MessagesChanged { preserve_scroll });
        SessionInner::refresh_caches(inner, &conversation_id);
        Ok(())
    }
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Apply one realtime snapshot to the live window.
    fn apply_snapshot(this: &Arc<SessionInner>, conversation_id: &str, snapshot: QuerySnapshot) {
        let (was_loading, preserve_scroll) = {
            let mut state = this.state.lock();
            if state.conversation_id.as_deref() != Some(conversation_id) {
                return;
            }
            if !state.window.saw_first_snapshot() {
                let docs: Vec<Message> = snapshot
                    .changes
                    .iter()
                    .filter(|change| change.kind != ChangeKind::Removed)
                    .filter_map(|change| Message::from_document(&change.doc))
                    .collect();
                state.window.apply_first_snapshot(docs);
            } else {
                let deltas: Vec<WindowDelta> = snapshot
                    .changes
                    .iter()
                    .filter_map(|change| match change.kind {
                        ChangeKind::Added | ChangeKind::Modified => {
                            Message::from_document(&change.doc).map(WindowDelta::Upsert)
                        }
                        ChangeKind::Removed => Some(WindowDelta::Remove(change.doc.id.clone())),
                    })
                    .collect();
                state.window.apply_changes(&deltas);
            }

            let was_loading = state.loading;
            state.loading = false;

            // First live data seeds the pagination cursor at the oldest
            // loaded message, unless a cache entry already did.
            if let Some(paginator) = &state.paginator {
                if !paginator.is_seeded() {
                    if let Some(oldest) = state.window.oldest() {
                        paginator.seed(Some(oldest.created_at_ms), Some(oldest.id.clone()));
                    }
                }
            }

            let preserve_scroll =
                state.scroll.offset_px > this.config.scroll_anchor_px && !state.scroll.dragging;
            (was_loading, preserve_scroll)
        };

        if was_loading {
            this.emit(SessionEvent::LoadingChanged { loading: false });
        }
        this.emit(SessionEvent::MessagesChanged { preserve_scroll });
        Self::refresh_caches(this, conversation_id);
    }

    /// Overwrite the in-memory cache immediately and schedule the debounced
    /// persistent save.
    fn refresh_caches(this: &Arc<SessionInner>, conversation_id: &str) {
        let entry = {
            let state = this.state.lock();
            if state.conversation_id.as_deref() != Some(conversation_id) {
                return;
            }
            Self::snapshot_entry(&state, &this.config)
        };
        this.memory.put(conversation_id, entry);

        let weak = Arc::downgrade(this);
        let conversation_id = conversation_id.to_string();
        this.saver.schedule(move || {
            let Some(inner) = weak.upgrade() else { return };
            let entry = {
                let state = inner.state.lock();
                if state.conversation_id.as_deref() != Some(conversation_id.as_str()) {
                    return;
                }
                Self::snapshot_entry(&state, &inner.config)
            };
            inner.recent.save(&conversation_id, &entry);
        });
    }

    /// Cache entry for the current transcript.
    ///
    /// When the capped entry keeps everything loaded so far, the live
    /// paginator cursor is the exact continuation. When older history had
    /// to be truncated, the cursor is pinned to the oldest persisted
    /// message instead, so a restored session resumes gap-free.
    fn snapshot_entry(state: &SessionState, config: &CoreConfig) -> CacheEntry {
        let combined = merge::combine(state.window.window(), state.window.older());
        let truncated = combined.len() > config.cached_message_limit;
        let mut entry = CacheEntry::capped(&combined, config.cached_message_limit);
        if truncated {
            if let Some(oldest) = entry.messages.last() {
                entry.last_visible_ms = Some(oldest.created_at_ms);
                entry.last_visible_id = Some(oldest.id.clone());
            }
        } else if let Some(paginator) = &state.paginator {
            let (last_visible_ms, last_visible_id) = paginator.cursor_snapshot();
            entry.last_visible_ms = last_visible_ms;
            entry.last_visible_id = last_visible_id;
        }
        entry
    }

    /// Issue the durable write for an optimistic message on a background
    /// task. Success needs no action: the subscription echo confirms the
    /// entry by id. Failure flips it to failed and surfaces a retry.
    ///
    /// The failure flip is keyed on the conversation id, not the attach
    /// epoch: a detach and reattach of the same conversation must still
    /// observe the failure, or the message would sit pending forever.
    fn spawn_write(this: &Arc<SessionInner>, conversation_id: String, message: Message) {
        let batch = outbox::build_send_batch(&conversation_id, &message);
        let store = this.store.clone();
        let weak = Arc::downgrade(this);
        tokio::spawn(async move {
            let Err(err) = store.commit(batch).await else {
                return;
            };
            tracing::warn!("send of {} failed: {}", message.id, err);
            let Some(inner) = weak.upgrade() else { return };
            {
                let mut state = inner.state.lock();
                if state.conversation_id.as_deref() != Some(conversation_id.as_str()) {
                    return;
                }
                state.window.set_delivery(&message.id, Delivery::Failed);
            }
            inner.emit(SessionEvent::SendFailed {
                message_id: message.id.clone(),
            });
            inner.emit(SessionEvent::MessagesChanged {
                preserve_scroll: false,
            });
            Self::refresh_caches(&inner, &conversation_id);
        });
    }
}
