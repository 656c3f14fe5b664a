use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::RemoteId;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub id: RemoteId,
    pub title: String,
    pub pinned: bool,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMessage {
    pub id: String,
    pub content: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub conversation_id: Option<RemoteId>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendReply {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendResponse {
    pub conversation_id: RemoteId,
    pub replies: Vec<SendReply>,
}
