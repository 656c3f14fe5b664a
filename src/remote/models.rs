use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{ConversationSummary, RemoteMessage, SendReply, SendResponse};
use crate::models::RemoteId;

// --- Request types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSendRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct WireRenameRequest {
    pub title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePinRequest {
    pub is_pinned: bool,
}

// --- Response types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConversation {
    pub id: String,
    pub title: String,
    #[serde(default, alias = "isPinned")]
    pub pinned: bool,
    pub last_activity_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: String,
    pub content: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct WireReply {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSendResponse {
    pub conversation_id: String,
    #[serde(default)]
    pub replies: Vec<WireReply>,
}

#[derive(Debug, Deserialize)]
pub struct WireErrorResponse {
    pub message: String,
}

impl From<WireConversation> for ConversationSummary {
    fn from(w: WireConversation) -> Self {
        Self {
            id: RemoteId::new(w.id),
            title: w.title,
            pinned: w.pinned,
            last_activity: w.last_activity_time,
        }
    }
}

impl From<WireMessage> for RemoteMessage {
    fn from(w: WireMessage) -> Self {
        Self {
            id: w.id,
            content: w.content,
            role: w.role,
            created_at: w.created_at,
        }
    }
}

impl From<WireSendResponse> for SendResponse {
    fn from(w: WireSendResponse) -> Self {
        Self {
            conversation_id: RemoteId::new(w.conversation_id),
            replies: w
                .replies
                .into_iter()
                .map(|r| SendReply { content: r.content })
                .collect(),
        }
    }
}
