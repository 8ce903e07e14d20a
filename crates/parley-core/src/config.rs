use std::time::Duration;

use crate::constants;

/// Tunables for the conversation sync core.
///
/// Defaults come from [`crate::constants`]; tests shrink the limits to keep
/// fixtures small.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Live window size (realtime subscription limit).
    pub live_limit: usize,
    /// Page size for older-history pagination.
    pub page_size: usize,
    /// Capacity of the in-memory conversation LRU cache.
    pub cache_capacity: usize,
    /// Maximum messages persisted per conversation.
    pub cached_message_limit: usize,
    /// Debounce interval for coalesced persistent-cache saves.
    pub save_debounce: Duration,
    /// Same-sender grouping window for visual runs.
    pub group_window_ms: i64,
    /// Minimum gap that forces a time separator.
    pub separator_gap_ms: i64,
    /// Scroll offset beyond which position is preserved on new messages.
    pub scroll_anchor_px: f32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            live_limit: constants::LIVE_WINDOW_LIMIT,
            page_size: constants::OLDER_PAGE_SIZE,
            cache_capacity: constants::MEMORY_CACHE_CAPACITY,
            cached_message_limit: constants::CACHED_MESSAGE_LIMIT,
            save_debounce: Duration::from_millis(constants::SAVE_DEBOUNCE_MS),
            group_window_ms: constants::GROUP_WINDOW_MS,
            separator_gap_ms: constants::SEPARATOR_GAP_MS,
            scroll_anchor_px: constants::SCROLL_ANCHOR_THRESHOLD_PX,
        }
    }
}
