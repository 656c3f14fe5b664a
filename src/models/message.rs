use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    Assistant,
    SystemError,
}

impl Sender {
    /// Roles the service reports in message history. Error messages are
    /// client-side only and never come back from the service.
    pub fn from_role(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Sender::User),
            "assistant" => Some(Sender::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub display_timestamp: String,
}

impl Message {
    pub fn new(id: String, text: String, sender: Sender, display_timestamp: String) -> Self {
        Self {
            id,
            text,
            sender,
            display_timestamp,
        }
    }

    pub fn is_error(&self) -> bool {
        self.sender == Sender::SystemError
    }
}
