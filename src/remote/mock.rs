use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::traits::ConversationService;
use super::types::{
    ConversationSummary, RemoteMessage, SendReply, SendRequest, SendResponse, ServiceError,
};
use crate::models::RemoteId;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List(String),
    GetMessages(RemoteId),
    Send(SendRequest),
    Rename(RemoteId, String),
    SetPinned(RemoteId, bool),
    Delete(RemoteId),
}

#[derive(Debug, Default)]
struct MockState {
    listing: Vec<ConversationSummary>,
    histories: HashMap<RemoteId, Vec<RemoteMessage>>,
    replies: Vec<String>,
    next_conversation: u32,
    calls: Vec<Call>,
    fail_list: bool,
    fail_history: bool,
    fail_send: bool,
    fail_rename: bool,
    fail_pin: bool,
    fail_delete: bool,
}

/// Scriptable in-memory service for tests.
#[derive(Debug, Default)]
pub struct MockConversationService {
    state: Mutex<MockState>,
}

pub fn at(hour: u32) -> DateTime<Utc> {
    use chrono::TimeZone;
    Utc.with_ymd_and_hms(2026, 10, 1, hour, 0, 0).unwrap()
}

impl MockConversationService {
    pub fn new() -> Self {
        let service = Self::default();
        service.state.lock().unwrap().replies = vec!["Hello! How can I help?".to_string()];
        service
    }

    pub fn with_listing(self, listing: Vec<ConversationSummary>) -> Self {
        self.state.lock().unwrap().listing = listing;
        self
    }

    pub fn with_history(self, id: &str, history: Vec<(&str, &str)>) -> Self {
        let messages = history
            .into_iter()
            .enumerate()
            .map(|(i, (role, content))| RemoteMessage {
                id: format!("{}-m{}", id, i),
                content: content.to_string(),
                role: role.to_string(),
                created_at: at(9),
            })
            .collect();
        self.state
            .lock()
            .unwrap()
            .histories
            .insert(RemoteId::new(id), messages);
        self
    }

    pub fn set_replies(&self, replies: &[&str]) {
        self.state.lock().unwrap().replies = replies.iter().map(|r| r.to_string()).collect();
    }

    pub fn fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub fn fail_history(&self, fail: bool) {
        self.state.lock().unwrap().fail_history = fail;
    }

    pub fn fail_send(&self, fail: bool) {
        self.state.lock().unwrap().fail_send = fail;
    }

    pub fn fail_rename(&self, fail: bool) {
        self.state.lock().unwrap().fail_rename = fail;
    }

    pub fn fail_pin(&self, fail: bool) {
        self.state.lock().unwrap().fail_pin = fail;
    }

    pub fn fail_delete(&self, fail: bool) {
        self.state.lock().unwrap().fail_delete = fail;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn history_fetches(&self, id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::GetMessages(r) if r.as_str() == id))
            .count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn scripted_failure(what: &str) -> ServiceError {
        ServiceError::RequestFailed(format!("scripted {} failure", what))
    }
}

pub fn summary(id: &str, title: &str, pinned: bool, hour: u32) -> ConversationSummary {
    ConversationSummary {
        id: RemoteId::new(id),
        title: title.to_string(),
        pinned,
        last_activity: at(hour),
    }
}

#[async_trait]
impl ConversationService for MockConversationService {
    async fn list_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, ServiceError> {
        self.record(Call::List(user_id.to_string()));
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(Self::scripted_failure("list"));
        }
        Ok(state.listing.clone())
    }

    async fn get_messages(&self, id: &RemoteId) -> Result<Vec<RemoteMessage>, ServiceError> {
        self.record(Call::GetMessages(id.clone()));
        let state = self.state.lock().unwrap();
        if state.fail_history {
            return Err(Self::scripted_failure("history"));
        }
        state
            .histories
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    async fn send_message(&self, request: SendRequest) -> Result<SendResponse, ServiceError> {
        self.record(Call::Send(request.clone()));
        let mut state = self.state.lock().unwrap();
        if state.fail_send {
            return Err(Self::scripted_failure("send"));
        }
        let conversation_id = match request.conversation_id {
            Some(id) => id,
            None => {
                state.next_conversation += 1;
                RemoteId::new(format!("srv-{}", state.next_conversation))
            }
        };
        let replies = state
            .replies
            .iter()
            .map(|content| SendReply {
                content: content.clone(),
            })
            .collect();
        Ok(SendResponse {
            conversation_id,
            replies,
        })
    }

    async fn rename_conversation(&self, id: &RemoteId, title: &str) -> Result<(), ServiceError> {
        self.record(Call::Rename(id.clone(), title.to_string()));
        if self.state.lock().unwrap().fail_rename {
            return Err(Self::scripted_failure("rename"));
        }
        Ok(())
    }

    async fn set_pinned(&self, id: &RemoteId, pinned: bool) -> Result<(), ServiceError> {
        self.record(Call::SetPinned(id.clone(), pinned));
        if self.state.lock().unwrap().fail_pin {
            return Err(Self::scripted_failure("pin"));
        }
        Ok(())
    }

    async fn delete_conversation(&self, id: &RemoteId) -> Result<(), ServiceError> {
        self.record(Call::Delete(id.clone()));
        let mut state = self.state.lock().unwrap();
        if state.fail_delete {
            return Err(Self::scripted_failure("delete"));
        }
        state.listing.retain(|c| &c.id != id);
        state.histories.remove(id);
        Ok(())
    }
}
