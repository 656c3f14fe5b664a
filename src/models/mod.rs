pub mod conversation;
pub mod message;

pub use conversation::{Conversation, ConversationId, LoadState, LocalId, RemoteId};
pub use message::{Message, Sender};
