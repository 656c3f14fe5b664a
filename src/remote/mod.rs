pub mod http;
pub mod models;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod mock;

pub use http::HttpConversationService;
pub use traits::ConversationService;
pub use types::{ConversationSummary, RemoteMessage, SendReply, SendRequest, SendResponse, ServiceError};
