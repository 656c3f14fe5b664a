use std::collections::{HashMap, HashSet};

use crate::models::{ConversationId, LoadState, Message, RemoteId, Sender};
use crate::remote::{RemoteMessage, ServiceError};
use crate::services::conversation::format_message_time;
use crate::services::store::ConversationStore;

/// A history fetch the caller should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryFetch {
    pub id: RemoteId,
    pub generation: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(usize),
    Failed(String),
    /// The conversation is gone or a newer fetch superseded this one.
    Dropped,
}

/// Lazy, memoized history loading: `NotLoaded -> Loading -> Loaded`, or back
/// to `NotLoaded` on failure so a later selection retries.
#[derive(Debug, Default)]
pub struct MessageLoader {
    in_flight: HashMap<RemoteId, u64>,
    next_generation: u64,
}

impl MessageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loading(&self, id: &RemoteId) -> bool {
        self.in_flight.contains_key(id)
    }

    /// Mark the conversation as loading if it needs its history.
    pub fn begin(&mut self, store: &mut ConversationStore, id: &ConversationId) -> Option<HistoryFetch> {
        let conversation = store.get(id)?;
        if !conversation.needs_history() {
            return None;
        }
        let remote = id.as_remote()?.clone();

        self.next_generation += 1;
        let generation = self.next_generation;
        self.in_flight.insert(remote.clone(), generation);
        store.set_load_state(id, LoadState::Loading);
        tracing::debug!("Fetching history for {} (generation {})", remote, generation);

        Some(HistoryFetch { id: remote, generation })
    }

    pub fn complete(
        &mut self,
        store: &mut ConversationStore,
        fetch: HistoryFetch,
        result: Result<Vec<RemoteMessage>, ServiceError>,
    ) -> LoadOutcome {
        if self.in_flight.get(&fetch.id) != Some(&fetch.generation) {
            tracing::debug!("Ignoring superseded history fetch for {}", fetch.id);
            return LoadOutcome::Dropped;
        }
        self.in_flight.remove(&fetch.id);

        let id = ConversationId::Remote(fetch.id);
        if !store.contains(&id) {
            tracing::debug!("Dropping history for deleted conversation {}", id);
            return LoadOutcome::Dropped;
        }

        match result.and_then(map_history) {
            Ok(history) => {
                let count = history.len();
                store.update(&id, |c| {
                    // Anything already present was sent while the fetch ran.
                    let sent_meanwhile = std::mem::take(&mut c.messages);
                    c.messages = history;
                    c.messages.extend(sent_meanwhile);
                    if let Some(last) = c.messages.last() {
                        c.last_message_preview = last.text.clone();
                    }
                    c.load_state = LoadState::Loaded;
                });
                tracing::debug!("Loaded {} messages for {}", count, id);
                LoadOutcome::Loaded(count)
            }
            Err(e) => {
                store.set_load_state(&id, LoadState::NotLoaded);
                tracing::warn!("Failed to load messages for {}: {}", id, e);
                LoadOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Convert the service's history, rejecting it whole if any entry is unusable.
fn map_history(remote: Vec<RemoteMessage>) -> Result<Vec<Message>, ServiceError> {
    let mut seen = HashSet::new();
    remote
        .into_iter()
        .map(|m| {
            let sender = Sender::from_role(&m.role).ok_or_else(|| {
                ServiceError::InvalidResponse(format!("Unknown role '{}' on message {}", m.role, m.id))
            })?;
            if !seen.insert(m.id.clone()) {
                return Err(ServiceError::InvalidResponse(format!(
                    "Duplicate message id {}",
                    m.id
                )));
            }
            Ok(Message::new(
                m.id,
                m.content,
                sender,
                format_message_time(&m.created_at),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::Conversation;

    fn store_with(id: &str) -> ConversationStore {
        let mut store = ConversationStore::new();
        store.upsert(Conversation::from_listing(
            RemoteId::new(id),
            "History".into(),
            false,
            Utc::now(),
        ));
        store
    }

    fn remote_msg(id: &str, role: &str, content: &str) -> RemoteMessage {
        RemoteMessage {
            id: id.to_string(),
            content: content.to_string(),
            role: role.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_success_replaces_and_marks_loaded() {
        let mut store = store_with("1");
        let mut loader = MessageLoader::new();
        let id = ConversationId::remote("1");

        let fetch = loader.begin(&mut store, &id).unwrap();
        assert_eq!(store.get(&id).unwrap().load_state, LoadState::Loading);
        assert!(loader.begin(&mut store, &id).is_none());

        let outcome = loader.complete(
            &mut store,
            fetch,
            Ok(vec![
                remote_msg("m1", "user", "When is registration?"),
                remote_msg("m2", "assistant", "Next Monday."),
            ]),
        );

        assert_eq!(outcome, LoadOutcome::Loaded(2));
        let conv = store.get(&id).unwrap();
        assert_eq!(conv.load_state, LoadState::Loaded);
        assert_eq!(conv.messages[1].sender, Sender::Assistant);
        assert_eq!(conv.last_message_preview, "Next Monday.");
        assert!(loader.begin(&mut store, &id).is_none());
    }

    #[test]
    fn test_failure_returns_to_not_loaded() {
        let mut store = store_with("1");
        let mut loader = MessageLoader::new();
        let id = ConversationId::remote("1");

        let fetch = loader.begin(&mut store, &id).unwrap();
        let outcome = loader.complete(
            &mut store,
            fetch,
            Err(ServiceError::NetworkError("offline".into())),
        );

        assert!(matches!(outcome, LoadOutcome::Failed(_)));
        assert_eq!(store.get(&id).unwrap().load_state, LoadState::NotLoaded);
        assert!(loader.begin(&mut store, &id).is_some());
    }

    #[test]
    fn test_malformed_history_is_not_committed() {
        let mut store = store_with("1");
        let mut loader = MessageLoader::new();
        let id = ConversationId::remote("1");

        let fetch = loader.begin(&mut store, &id).unwrap();
        let outcome = loader.complete(
            &mut store,
            fetch,
            Ok(vec![
                remote_msg("m1", "user", "hi"),
                remote_msg("m2", "moderator", "??"),
            ]),
        );

        assert!(matches!(outcome, LoadOutcome::Failed(_)));
        let conv = store.get(&id).unwrap();
        assert!(conv.messages.is_empty());
        assert_eq!(conv.load_state, LoadState::NotLoaded);
    }

    #[test]
    fn test_fetch_for_deleted_conversation_is_dropped() {
        let mut store = store_with("1");
        let mut loader = MessageLoader::new();
        let id = ConversationId::remote("1");

        let fetch = loader.begin(&mut store, &id).unwrap();
        store.remove(&id);
        let outcome = loader.complete(&mut store, fetch, Ok(vec![remote_msg("m1", "user", "hi")]));

        assert_eq!(outcome, LoadOutcome::Dropped);
        assert!(store.is_empty());
        assert!(!loader.is_loading(&RemoteId::new("1")));
    }

    #[test]
    fn test_messages_sent_during_fetch_stay_after_history() {
        let mut store = store_with("1");
        let mut loader = MessageLoader::new();
        let id = ConversationId::remote("1");

        let fetch = loader.begin(&mut store, &id).unwrap();
        store.append_messages(
            &id,
            vec![Message::new("local-1".into(), "new question".into(), Sender::User, "10:00".into())],
        );
        loader.complete(&mut store, fetch, Ok(vec![remote_msg("m1", "assistant", "old answer")]));

        let texts: Vec<&str> = store
            .get(&id)
            .unwrap()
            .messages
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(texts, vec!["old answer", "new question"]);
    }

    #[test]
    fn test_local_conversation_never_fetches() {
        let mut store = ConversationStore::new();
        let local = Conversation::new_local("New Chat".into(), String::new(), Utc::now());
        let id = local.id.clone();
        store.upsert(local);

        assert!(MessageLoader::new().begin(&mut store, &id).is_none());
    }
}
