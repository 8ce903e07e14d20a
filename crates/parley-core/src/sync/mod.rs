pub mod live_window;
pub mod merge;
pub mod outbox;
pub mod paginator;
pub mod session;
pub mod visual;

pub use live_window::{LiveWindow, WindowDelta};
pub use paginator::{HistoryPaginator, Page};
pub use session::{ConversationSession, ScrollState};
pub use visual::{RunPosition, Separator, VisualAnnotation};
