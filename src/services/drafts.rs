use std::collections::HashMap;

use crate::models::ConversationId;

/// Where a draft belongs: a conversation, or the composer shown while no
/// conversation is selected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DraftKey {
    Unselected,
    Conversation(ConversationId),
}

impl From<Option<&ConversationId>> for DraftKey {
    fn from(active: Option<&ConversationId>) -> Self {
        match active {
            Some(id) => DraftKey::Conversation(id.clone()),
            None => DraftKey::Unselected,
        }
    }
}

/// Unsent composer text per conversation, kept for the session only.
#[derive(Debug, Default)]
pub struct DraftCache {
    drafts: HashMap<DraftKey, String>,
}

impl DraftCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &DraftKey) -> &str {
        self.drafts.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: DraftKey, text: String) {
        if text.is_empty() {
            self.drafts.remove(&key);
        } else {
            self.drafts.insert(key, text);
        }
    }

    pub fn clear(&mut self, key: &DraftKey) {
        self.drafts.remove(key);
    }

    /// Follow a conversation whose id was promoted.
    pub fn rekey(&mut self, old_id: &ConversationId, new_id: &ConversationId) {
        if let Some(text) = self.drafts.remove(&DraftKey::Conversation(old_id.clone())) {
            self.drafts.insert(DraftKey::Conversation(new_id.clone()), text);
        }
    }

    pub fn remove_conversation(&mut self, id: &ConversationId) {
        self.drafts.remove(&DraftKey::Conversation(id.clone()));
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}
