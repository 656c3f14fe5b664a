pub mod chat;
pub mod conversation;
pub mod drafts;
pub mod loader;
pub mod ordering;
pub mod store;
pub mod sync;

pub use drafts::{DraftCache, DraftKey};
pub use loader::MessageLoader;
pub use store::ConversationStore;
pub use sync::{Notice, NoticeKind, SyncCoordinator, SyncError};
