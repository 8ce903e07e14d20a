//! Merge engine: combines the live window and the older buffer into the
//! canonical display sequence.

use std::collections::HashSet;

use crate::models::Message;

/// Union the live window and older buffer by id and sort newest-first.
///
/// First occurrence wins, with the live window iterated first: on an id
/// collision the live entry is the freshest copy. The returned sequence is
/// exactly what gets rendered; pagination appends into the older buffer,
/// never into the window.
pub fn combine(window: &[Message], older: &[Message]) -> Vec<Message> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(window.len() + older.len());
    let mut combined: Vec<Message> = Vec::with_capacity(window.len() + older.len());
    for message in window.iter().chain(older) {
        if seen.insert(message.id.as_str()) {
            combined.push(message.clone());
        }
    }
    combined.sort_by(|a, b| {
        b.created_at_ms
            .cmp(&a.created_at_ms)
            .then_with(|| b.id.cmp(&a.id))
    });
    combined
}
