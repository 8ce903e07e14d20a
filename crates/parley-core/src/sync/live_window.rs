//! Bounded live window over the realtime subscription, plus the
//! older-history buffer it overflows into.
//!
//! The window holds at most `limit` messages, newest-first. When a delta or
//! an optimistic injection pushes it past the limit, the oldest entries are
//! moved into the older buffer rather than dropped, so no message is ever
//! silently lost to overflow.

use std::collections::HashMap;

use crate::models::{Delivery, Message};

/// One change to apply against the window's working set. Optimistic local
/// entries use their client id as the document id, so a plain id match
/// covers both confirmed and not-yet-confirmed messages.
#[derive(Debug, Clone)]
pub enum WindowDelta {
    Upsert(Message),
    Remove(String),
}

#[derive(Debug)]
pub struct LiveWindow {
    limit: usize,
    /// Newest-first, length <= limit.
    window: Vec<Message>,
    /// Newest-first continuation: overflow from the window followed by
    /// paginated history. Bounded only by how far the user scrolls.
    older: Vec<Message>,
    saw_first_snapshot: bool,
}

fn sort_newest_first(messages: &mut [Message]) {
    // Tie-break on id so equal timestamps order deterministically.
    messages.sort_by(|a, b| {
        b.created_at_ms
            .cmp(&a.created_at_ms)
            .then_with(|| b.id.cmp(&a.id))
    });
}

impl LiveWindow {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            window: Vec::new(),
            older: Vec::new(),
            saw_first_snapshot: false,
        }
    }

    pub fn window(&self) -> &[Message] {
        &self.window
    }

    pub fn older(&self) -> &[Message] {
        &self.older
    }

    pub fn saw_first_snapshot(&self) -> bool {
        self.saw_first_snapshot
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty() && self.older.is_empty()
    }

    /// Oldest message currently held, across both buffers.
    pub fn oldest(&self) -> Option<&Message> {
        self.older.last().or_else(|| self.window.last())
    }

    pub fn find(&self, id: &str) -> Option<&Message> {
        self.window
            .iter()
            .find(|m| m.id == id)
            .or_else(|| self.older.iter().find(|m| m.id == id))
    }

    /// Populate from a cache entry ahead of the first live snapshot.
    pub fn preload(&mut self, cached: &[Message]) {
        let mut messages = cached.to_vec();
        sort_newest_first(&mut messages);
        messages.dedup_by(|a, b| a.id == b.id);
        self.window = messages;
        self.older.clear();
        self.rebalance();
    }

    /// Apply the initial subscription snapshot.
    ///
    /// Server documents win on id collision with cache-preloaded entries.
    /// An unexpectedly empty snapshot keeps the preloaded messages, so a
    /// transient empty read cannot mask good cached data.
    pub fn apply_first_snapshot(&mut self, docs: Vec<Message>) {
        self.saw_first_snapshot = true;
        if docs.is_empty() {
            if !self.window.is_empty() {
                tracing::debug!("empty first snapshot, keeping {} cached messages", self.window.len());
            }
            return;
        }

        let mut by_id: HashMap<String, Message> = HashMap::new();
        for message in self.window.drain(..) {
            by_id.insert(message.id.clone(), message);
        }
        for message in docs {
            by_id.insert(message.id.clone(), message);
        }
        self.window = by_id.into_values().collect();
        sort_newest_first(&mut self.window);
        self.rebalance();
    }

    /// Apply an incremental change list from the subscription.
    ///
    /// Removals are also applied to the older buffer: a `removed` change can
    /// target a message that already overflowed out of the live window, and
    /// ignoring it would leave a ghost entry in the transcript.
    pub fn apply_changes(&mut self, deltas: &[WindowDelta]) {
        let mut by_id: HashMap<String, Message> = HashMap::new();
        for message in self.window.drain(..) {
            by_id.insert(message.id.clone(), message);
        }
        for delta in deltas {
            match delta {
                WindowDelta::Upsert(message) => {
                    by_id.insert(message.id.clone(), message.clone());
                }
                WindowDelta::Remove(id) => {
                    by_id.remove(id);
                    self.older.retain(|m| m.id != *id);
                }
            }
        }
        self.window = by_id.into_values().collect();
        sort_newest_first(&mut self.window);
        self.rebalance();
    }

    /// Insert an optimistic pending message at the head, applying the same
    /// overflow rule as subscription deltas.
    pub fn inject_pending(&mut self, message: Message) {
        self.window.retain(|m| m.id != message.id);
        self.window.insert(0, message);
        sort_newest_first(&mut self.window);
        self.rebalance();
    }

    /// Flip the delivery state of a message in either buffer.
    pub fn set_delivery(&mut self, id: &str, delivery: Delivery) -> bool {
        if let Some(message) = self
            .window
            .iter_mut()
            .chain(self.older.iter_mut())
            .find(|m| m.id == id)
        {
            message.delivery = delivery;
            true
        } else {
            false
        }
    }

    /// Append a page of older history at the tail of the older buffer,
    /// skipping anything already held.
    pub fn extend_older(&mut self, page: Vec<Message>) {
        for message in page {
            if self.find(&message.id).is_none() {
                self.older.push(message);
            }
        }
    }

    /// Move window overflow (entries past `limit`) to the front of the
    /// older buffer. Overflowed entries are older than everything left in
    /// the window but newer than existing older-buffer content.
    fn rebalance(&mut self) {
        if self.window.len() <= self.limit {
            return;
        }
        let overflow: Vec<Message> = self.window.split_off(self.limit);
        let overflow_ids: Vec<&str> = overflow.iter().map(|m| m.id.as_str()).collect();
        self.older.retain(|m| !overflow_ids.contains(&m.id.as_str()));
        self.older.splice(0..0, overflow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sender;
    use std::collections::HashSet;

    fn msg(id: &str, ms: i64) -> Message {
        Message {
            id: id.into(),
            text: format!("text {id}"),
            sender: Sender::User,
            created_at_ms: ms,
            delivery: Delivery::Confirmed,
        }
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn first_snapshot_merges_and_server_wins() {
        let mut window = LiveWindow::new(30);
        let mut cached = msg("m1", 100);
        cached.text = "stale".into();
        window.preload(&[cached, msg("m2", 90)]);

        let mut fresh = msg("m1", 100);
        fresh.text = "updated".into();
        window.apply_first_snapshot(vec![fresh, msg("m3", 110)]);

        assert_eq!(ids(window.window()), vec!["m3", "m1", "m2"]);
        assert_eq!(window.window()[1].text, "updated");
    }

    #[test]
    fn empty_first_snapshot_keeps_cached_messages() {
        let mut window = LiveWindow::new(30);
        window.preload(&[msg("m1", 100)]);
        window.apply_first_snapshot(Vec::new());
        assert_eq!(ids(window.window()), vec!["m1"]);
        assert!(window.saw_first_snapshot());
    }

    #[test]
    fn overflow_moves_oldest_into_older_buffer() {
        let mut window = LiveWindow::new(30);
        let initial: Vec<Message> = (0..30).map(|i| msg(&format!("m{i}"), 1000 - i)).collect();
        window.apply_first_snapshot(initial);
        assert_eq!(window.window().len(), 30);
        assert!(window.older().is_empty());

        let before: HashSet<String> = window
            .window()
            .iter()
            .map(|m| m.id.clone())
            .collect();

        window.apply_changes(&[WindowDelta::Upsert(msg("new", 2000))]);

        assert_eq!(window.window().len(), 30);
        assert_eq!(window.older().len(), 1);
        // The previously-oldest message is the one evicted.
        assert_eq!(window.older()[0].id, "m29");

        // Conservation: everything from before is still held somewhere.
        let after: HashSet<String> = window
            .window()
            .iter()
            .chain(window.older())
            .map(|m| m.id.clone())
            .collect();
        for id in &before {
            assert!(after.contains(id), "lost {id} to overflow");
        }
        assert!(after.contains("new"));
    }

    #[test]
    fn modified_change_overwrites_by_id() {
        let mut window = LiveWindow::new(30);
        window.apply_first_snapshot(vec![msg("m1", 100)]);

        let mut edited = msg("m1", 100);
        edited.text = "edited".into();
        window.apply_changes(&[WindowDelta::Upsert(edited)]);

        assert_eq!(window.window().len(), 1);
        assert_eq!(window.window()[0].text, "edited");
    }

    #[test]
    fn removal_applies_to_older_buffer_too() {
        let mut window = LiveWindow::new(2);
        window.apply_first_snapshot(vec![msg("m1", 300), msg("m2", 200)]);
        // m3 arrives, m2 overflows into older.
        window.apply_changes(&[WindowDelta::Upsert(msg("m3", 400))]);
        assert_eq!(ids(window.older()), vec!["m2"]);

        // A removal for the already-evicted m2 must not leave a ghost.
        window.apply_changes(&[WindowDelta::Remove("m2".into())]);
        assert!(window.older().is_empty());
        assert_eq!(ids(window.window()), vec!["m3", "m1"]);
    }

    #[test]
    fn inject_pending_applies_overflow_rule() {
        let mut window = LiveWindow::new(2);
        window.apply_first_snapshot(vec![msg("m1", 300), msg("m2", 200)]);

        let mut pending = msg("local-1", 400);
        pending.delivery = Delivery::Pending;
        window.inject_pending(pending);

        assert_eq!(ids(window.window()), vec!["local-1", "m1"]);
        assert_eq!(ids(window.older()), vec!["m2"]);
    }

    #[test]
    fn server_echo_confirms_pending_entry() {
        let mut window = LiveWindow::new(30);
        let mut pending = msg("client-1", 400);
        pending.delivery = Delivery::Pending;
        window.inject_pending(pending);

        window.apply_first_snapshot(vec![msg("client-1", 405)]);
        assert_eq!(window.window().len(), 1);
        assert_eq!(window.window()[0].delivery, Delivery::Confirmed);
        assert_eq!(window.window()[0].created_at_ms, 405);
    }

    #[test]
    fn extend_older_skips_duplicates() {
        let mut window = LiveWindow::new(30);
        window.apply_first_snapshot(vec![msg("m1", 300)]);
        window.extend_older(vec![msg("m1", 300), msg("m0", 200)]);
        assert_eq!(ids(window.older()), vec!["m0"]);
    }

    #[test]
    fn set_delivery_reaches_both_buffers() {
        let mut window = LiveWindow::new(1);
        window.apply_first_snapshot(vec![msg("m2", 200), msg("m1", 100)]);
        assert_eq!(ids(window.older()), vec!["m1"]);

        assert!(window.set_delivery("m1", Delivery::Failed));
        assert!(window.older()[0].failed());
        assert!(!window.set_delivery("missing", Delivery::Failed));
    }
}
