use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;

const LOCAL_ID_PREFIX: &str = "local-";

/// Client-synthesized identifier for a conversation the service has not
/// acknowledged yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId(Uuid);

impl LocalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", LOCAL_ID_PREFIX, self.0)
    }
}

/// Identifier assigned by the conversation service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationId {
    Local(LocalId),
    Remote(RemoteId),
}

impl ConversationId {
    pub fn new_local() -> Self {
        ConversationId::Local(LocalId::new())
    }

    pub fn remote(id: impl Into<String>) -> Self {
        ConversationId::Remote(RemoteId::new(id))
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ConversationId::Local(_))
    }

    /// The identifier to hand to the service, if it is authoritative.
    pub fn as_remote(&self) -> Option<&RemoteId> {
        match self {
            ConversationId::Remote(id) => Some(id),
            ConversationId::Local(_) => None,
        }
    }
}

impl From<RemoteId> for ConversationId {
    fn from(id: RemoteId) -> Self {
        ConversationId::Remote(id)
    }
}

impl From<LocalId> for ConversationId {
    fn from(id: LocalId) -> Self {
        ConversationId::Local(id)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationId::Local(id) => id.fmt(f),
            ConversationId::Remote(id) => id.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub last_message_preview: String,
    pub last_activity: DateTime<Utc>,
    pub pinned: bool,
    pub messages: Vec<Message>,
    pub load_state: LoadState,
}

impl Conversation {
    /// A conversation that exists only on this client so far. There is no
    /// remote history to fetch, so it starts out loaded.
    pub fn new_local(title: String, preview: String, now: DateTime<Utc>) -> Self {
        Self {
            id: ConversationId::new_local(),
            title,
            last_message_preview: preview,
            last_activity: now,
            pinned: false,
            messages: Vec::new(),
            load_state: LoadState::Loaded,
        }
    }

    /// A conversation known from the service listing, history not yet fetched.
    pub fn from_listing(
        id: RemoteId,
        title: String,
        pinned: bool,
        last_activity: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConversationId::Remote(id),
            title,
            last_message_preview: String::new(),
            last_activity,
            pinned,
            messages: Vec::new(),
            load_state: LoadState::NotLoaded,
        }
    }

    /// Selecting this conversation should fetch its history.
    pub fn needs_history(&self) -> bool {
        !self.id.is_local() && self.messages.is_empty() && self.load_state == LoadState::NotLoaded
    }
}
