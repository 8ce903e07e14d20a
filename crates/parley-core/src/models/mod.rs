pub mod cache_entry;
pub mod message;

pub use cache_entry::CacheEntry;
pub use message::{now_ms, Delivery, Message, Sender};
