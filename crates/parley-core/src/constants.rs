//! Application-wide constants
//!
//! Centralized location for the tuning values used across multiple modules.
//! `CoreConfig` picks these up as defaults; tests shrink them as needed.

/// Maximum number of messages held in the realtime live window.
/// Overflow is moved into the older-history buffer, never dropped.
pub const LIVE_WINDOW_LIMIT: usize = 30;

/// Number of messages fetched per pagination request.
pub const OLDER_PAGE_SIZE: usize = 20;

/// Maximum number of conversations retained by the in-memory LRU cache.
pub const MEMORY_CACHE_CAPACITY: usize = 8;

/// Quiet period before a coalesced persistent-cache write fires.
/// Multiple rapid changes collapse into a single write.
pub const SAVE_DEBOUNCE_MS: u64 = 800;

/// Maximum number of messages persisted per conversation cache entry.
pub const CACHED_MESSAGE_LIMIT: usize = 30;

/// Messages from the same sender within this window render as one visual run.
pub const GROUP_WINDOW_MS: i64 = 3 * 60 * 1000;

/// A gap of at least this much from the nearest earlier real message
/// inserts a time separator.
pub const SEPARATOR_GAP_MS: i64 = 10 * 60 * 1000;

/// Scroll offset (px-equivalent) beyond which incoming messages preserve
/// the reader's position instead of jumping to newest.
pub const SCROLL_ANCHOR_THRESHOLD_PX: f32 = 120.0;

/// Increment whenever the persisted cache-entry schema changes in a way
/// that would make old entries unreadable. Old entries are silently
/// discarded on the next load.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Maximum persisted cache-entry age in milliseconds (7 days).
/// Entries older than this are discarded on load.
pub const MAX_CACHE_AGE_MS: i64 = 7 * 24 * 60 * 60 * 1000;
