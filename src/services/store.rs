use crate::models::{Conversation, ConversationId, LoadState, Message, RemoteId};

/// Copy of the store taken before an optimistic mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    conversations: Vec<Conversation>,
}

impl StoreSnapshot {
    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    pub fn position(&self, id: &ConversationId) -> Option<usize> {
        self.conversations.iter().position(|c| &c.id == id)
    }
}

/// Canonical in-memory collection of conversations.
///
/// Every mutation runs to completion before returning and bumps the
/// revision, so callers can tell whether anything changed between two
/// points in time.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    revision: u64,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: &ConversationId) -> Option<usize> {
        self.conversations.iter().position(|c| &c.id == id)
    }

    /// Replace the conversation with the same id in place, or append it.
    pub fn upsert(&mut self, conversation: Conversation) {
        match self.position(&conversation.id) {
            Some(index) => self.conversations[index] = conversation,
            None => self.conversations.push(conversation),
        }
        self.bump();
    }

    pub fn insert_front(&mut self, conversation: Conversation) {
        if let Some(index) = self.position(&conversation.id) {
            self.conversations.remove(index);
        }
        self.conversations.insert(0, conversation);
        self.bump();
    }

    /// Remove a conversation, returning it with the index it occupied.
    pub fn remove(&mut self, id: &ConversationId) -> Option<(usize, Conversation)> {
        let index = self.position(id)?;
        let conversation = self.conversations.remove(index);
        self.bump();
        Some((index, conversation))
    }

    /// Apply `f` to one conversation. Returns false if it does not exist.
    pub fn update<F>(&mut self, id: &ConversationId, f: F) -> bool
    where
        F: FnOnce(&mut Conversation),
    {
        let Some(index) = self.position(id) else {
            return false;
        };
        f(&mut self.conversations[index]);
        self.bump();
        true
    }

    pub fn append_messages(&mut self, id: &ConversationId, messages: Vec<Message>) -> bool {
        self.update(id, |c| c.messages.extend(messages))
    }

    pub fn set_load_state(&mut self, id: &ConversationId, state: LoadState) -> bool {
        self.update(id, |c| c.load_state = state)
    }

    /// Give a local conversation its authoritative id, keeping its position
    /// and data. A listed copy already holding `new_id` is superseded by the
    /// promoted entry.
    pub fn promote_id(&mut self, old_id: &ConversationId, new_id: RemoteId) -> bool {
        if !old_id.is_local() || !self.contains(old_id) {
            return false;
        }

        let new_id = ConversationId::Remote(new_id);
        if let Some(duplicate) = self.position(&new_id) {
            let superseded = self.conversations.remove(duplicate);
            tracing::debug!(
                "Promotion of {} supersedes listed copy {}",
                old_id,
                superseded.id
            );
        }
        let Some(index) = self.position(old_id) else {
            return false;
        };
        self.conversations[index].id = new_id;
        self.bump();
        true
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            conversations: self.conversations.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: StoreSnapshot) {
        self.conversations = snapshot.conversations;
        self.bump();
    }

    /// Put back a removed conversation at the position it held in
    /// `snapshot`, leaving every other entry alone.
    pub fn reinsert_from(&mut self, snapshot: &StoreSnapshot, id: &ConversationId) -> bool {
        if self.contains(id) {
            return false;
        }
        let (Some(index), Some(original)) = (snapshot.position(id), snapshot.get(id)) else {
            return false;
        };
        let index = index.min(self.conversations.len());
        self.conversations.insert(index, original.clone());
        self.bump();
        true
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::Sender;

    fn remote(id: &str, title: &str) -> Conversation {
        Conversation::from_listing(RemoteId::new(id), title.to_string(), false, Utc::now())
    }

    fn ids(store: &ConversationStore) -> Vec<String> {
        store.list().iter().map(|c| c.id.to_string()).collect()
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut store = ConversationStore::new();
        store.upsert(remote("1", "a"));
        store.upsert(remote("2", "b"));
        store.upsert(remote("1", "renamed"));
        assert_eq!(ids(&store), vec!["1", "2"]);
        assert_eq!(store.get(&ConversationId::remote("1")).unwrap().title, "renamed");
    }

    #[test]
    fn test_remove_reports_position() {
        let mut store = ConversationStore::new();
        store.upsert(remote("1", "a"));
        store.upsert(remote("2", "b"));
        let (index, removed) = store.remove(&ConversationId::remote("2")).unwrap();
        assert_eq!(index, 1);
        assert_eq!(removed.title, "b");
        assert!(store.remove(&ConversationId::remote("2")).is_none());
    }

    #[test]
    fn test_snapshot_restore_preserves_position() {
        let mut store = ConversationStore::new();
        store.upsert(remote("1", "a"));
        store.upsert(remote("2", "b"));
        store.upsert(remote("3", "c"));
        let snapshot = store.snapshot();

        store.remove(&ConversationId::remote("2"));
        store.update(&ConversationId::remote("3"), |c| c.title = "changed".into());
        store.restore(snapshot.clone());

        assert_eq!(store.list(), snapshot.conversations.as_slice());
        assert_eq!(ids(&store), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_reinsert_from_keeps_siblings() {
        let mut store = ConversationStore::new();
        store.upsert(remote("1", "a"));
        store.upsert(remote("2", "b"));
        let snapshot = store.snapshot();

        store.remove(&ConversationId::remote("1"));
        store.update(&ConversationId::remote("2"), |c| c.title = "newer".into());

        assert!(store.reinsert_from(&snapshot, &ConversationId::remote("1")));
        assert_eq!(ids(&store), vec!["1", "2"]);
        assert_eq!(store.get(&ConversationId::remote("2")).unwrap().title, "newer");
    }

    #[test]
    fn test_promote_only_from_local() {
        let mut store = ConversationStore::new();
        store.upsert(remote("1", "a"));
        let local = Conversation::new_local("Hello".into(), String::new(), Utc::now());
        let local_id = local.id.clone();
        store.insert_front(local);

        assert!(!store.promote_id(&ConversationId::remote("1"), RemoteId::new("9")));
        assert!(store.promote_id(&local_id, RemoteId::new("9")));
        assert!(!store.contains(&local_id));
        assert_eq!(ids(&store), vec!["9", "1"]);
        assert!(!store.promote_id(&local_id, RemoteId::new("10")));
    }

    #[test]
    fn test_promote_supersedes_listed_duplicate() {
        let mut store = ConversationStore::new();
        store.upsert(remote("9", "listed"));
        let mut local = Conversation::new_local("Hello".into(), String::new(), Utc::now());
        local.messages.push(Message::new("u1".into(), "Hello".into(), Sender::User, "10:00".into()));
        let local_id = local.id.clone();
        store.upsert(local);

        assert!(store.promote_id(&local_id, RemoteId::new("9")));
        assert_eq!(store.len(), 1);
        let promoted = store.get(&ConversationId::remote("9")).unwrap();
        assert_eq!(promoted.title, "Hello");
        assert_eq!(promoted.messages.len(), 1);
    }

    #[test]
    fn test_every_mutation_bumps_revision() {
        let mut store = ConversationStore::new();
        let r0 = store.revision();
        store.upsert(remote("1", "a"));
        let r1 = store.revision();
        store.set_load_state(&ConversationId::remote("1"), LoadState::Loading);
        let r2 = store.revision();
        assert!(r0 < r1 && r1 < r2);

        assert!(!store.set_load_state(&ConversationId::remote("missing"), LoadState::Loaded));
        assert_eq!(store.revision(), r2);
    }
}
