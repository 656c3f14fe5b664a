use async_trait::async_trait;

use super::types::{ConversationSummary, RemoteMessage, SendRequest, SendResponse, ServiceError};
use crate::models::RemoteId;

/// The authoritative conversation backend. Only [`RemoteId`]s cross this
/// boundary; a client-local id has no way to reach the service.
#[async_trait]
pub trait ConversationService: Send + Sync {
    async fn list_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, ServiceError>;

    async fn get_messages(&self, id: &RemoteId) -> Result<Vec<RemoteMessage>, ServiceError>;

    /// A request without a conversation id asks the service to create one.
    async fn send_message(&self, request: SendRequest) -> Result<SendResponse, ServiceError>;

    async fn rename_conversation(&self, id: &RemoteId, title: &str) -> Result<(), ServiceError>;

    async fn set_pinned(&self, id: &RemoteId, pinned: bool) -> Result<(), ServiceError>;

    async fn delete_conversation(&self, id: &RemoteId) -> Result<(), ServiceError>;
}
