pub mod kv;
pub mod memory_cache;
pub mod recent_cache;

pub use kv::{FileKvStore, KeyValueStore, MemoryKvStore};
pub use memory_cache::ConversationCache;
pub use recent_cache::RecentMessageStore;
