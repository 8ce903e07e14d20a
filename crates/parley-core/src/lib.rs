pub mod config;
pub mod constants;
pub mod debounce;
pub mod docstore;
pub mod events;
pub mod models;
pub mod store;
pub mod sync;
pub mod tracing_setup;

// Re-export the main surface at the crate root for convenience
pub use config::CoreConfig;
pub use events::SessionEvent;
pub use models::{CacheEntry, Delivery, Message, Sender};
pub use sync::{ConversationSession, RunPosition, ScrollState, Separator, VisualAnnotation};
