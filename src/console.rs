use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

use nupal_chat::models::{Conversation, ConversationId, Message, Sender};
use nupal_chat::services::conversation::format_activity;
use nupal_chat::{Notice, SyncCoordinator};

pub const HELP: &str = "\
Commands:
  /new                 start a new conversation
  /list                list conversations
  /open <n>            select conversation n
  /rename <n> <title>  rename conversation n
  /pin <n>             pin or unpin conversation n
  /delete <n>          delete conversation n
  /search <query>      filter by title or last message
  /draft <text>        save unsent text for the current conversation
  /help                show this help
  /quit                exit
Anything else is sent as a message.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New,
    List,
    Open(usize),
    Rename(usize, String),
    Pin(usize),
    Delete(usize),
    Search(String),
    Draft(String),
    Help,
    Quit,
    Send(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: /{0} (try /help)")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("No conversation #{0}")]
    NoSuchConversation(usize),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Command::Send(line.to_string()));
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        match name {
            "new" => Ok(Command::New),
            "list" | "ls" => Ok(Command::List),
            "open" => index(args, "/open <n>").map(Command::Open),
            "pin" => index(args, "/pin <n>").map(Command::Pin),
            "delete" | "rm" => index(args, "/delete <n>").map(Command::Delete),
            "rename" => {
                const USAGE: &str = "/rename <n> <title>";
                let (n, title) = args.split_once(char::is_whitespace).ok_or(CommandError::Usage(USAGE))?;
                Ok(Command::Rename(index(n, USAGE)?, title.trim().to_string()))
            }
            "search" => Ok(Command::Search(args.to_string())),
            "draft" => Ok(Command::Draft(args.to_string())),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Parse a 1-based list position.
fn index(arg: &str, usage: &'static str) -> Result<usize, CommandError> {
    match arg.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CommandError::Usage(usage)),
    }
}

/// Run one command against the coordinator and return what to print.
pub fn execute(sync: &mut SyncCoordinator, command: Command) -> Result<String, CommandError> {
    let now = Utc::now();
    let output = match command {
        Command::New => {
            sync.new_conversation();
            render_list(sync, "", &now)
        }
        Command::List => render_list(sync, "", &now),
        Command::Search(query) => render_list(sync, &query, &now),
        Command::Open(n) => {
            let id = nth(sync, n)?;
            match sync.select_conversation(&id) {
                Ok(()) => render_active(sync),
                Err(e) => e.to_string(),
            }
        }
        Command::Rename(n, title) => {
            let id = nth(sync, n)?;
            match sync.rename_conversation(&id, &title) {
                Ok(()) => render_list(sync, "", &now),
                Err(e) => e.to_string(),
            }
        }
        Command::Pin(n) => {
            let id = nth(sync, n)?;
            match sync.toggle_pin(&id) {
                Ok(true) => "Pinned.".to_string(),
                Ok(false) => "Unpinned.".to_string(),
                Err(e) => e.to_string(),
            }
        }
        Command::Delete(n) => {
            let id = nth(sync, n)?;
            match sync.delete_conversation(&id) {
                Ok(()) => "Deleted.".to_string(),
                Err(e) => e.to_string(),
            }
        }
        Command::Draft(text) => {
            sync.update_draft(&text);
            "Draft saved.".to_string()
        }
        Command::Send(text) => match sync.send_message(&text) {
            Ok(_) => render_active(sync),
            Err(e) => e.to_string(),
        },
        Command::Help => HELP.to_string(),
        Command::Quit => String::new(),
    };
    Ok(output)
}

fn nth(sync: &SyncCoordinator, n: usize) -> Result<ConversationId, CommandError> {
    n.checked_sub(1)
        .and_then(|i| sync.conversations().get(i).map(|c| c.id.clone()))
        .ok_or(CommandError::NoSuchConversation(n))
}

/// Numbered conversation list. Positions refer to the unfiltered order so
/// a number from a search result can be passed straight to `/open`.
pub fn render_list(sync: &SyncCoordinator, query: &str, now: &DateTime<Utc>) -> String {
    if sync.is_initial_loading() && sync.store().is_empty() {
        return "Loading conversations...".to_string();
    }

    let all = sync.conversations();
    let hits = sync.filtered_conversations(query);
    if hits.is_empty() {
        return if query.trim().is_empty() {
            "No conversations yet.".to_string()
        } else {
            format!("No conversations match '{}'.", query.trim())
        };
    }

    hits.iter()
        .map(|hit| {
            let n = all.iter().position(|c| c.id == hit.id).map_or(0, |i| i + 1);
            let active = sync.active_id() == Some(&hit.id);
            let busy = sync.is_busy(&hit.id);
            render_row(n, hit, active, busy, now)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_row(n: usize, conversation: &Conversation, active: bool, busy: bool, now: &DateTime<Utc>) -> String {
    let mut row = format!(
        "{}{:>3}. {}{}  ({})",
        if active { ">" } else { " " },
        n,
        if conversation.pinned { "* " } else { "" },
        conversation.title,
        format_activity(&conversation.last_activity, now)
    );
    if busy {
        row.push_str(" ...");
    }
    if !conversation.last_message_preview.is_empty() {
        row.push_str("\n       ");
        row.push_str(&conversation.last_message_preview);
    }
    row
}

/// The selected conversation's transcript, plus any saved draft.
pub fn render_active(sync: &SyncCoordinator) -> String {
    let Some(conversation) = sync.active_conversation() else {
        return "No conversation selected. Type a message to start one.".to_string();
    };

    let mut lines = vec![format!("== {} ==", conversation.title)];
    if sync.is_loading_history(&conversation.id) {
        lines.push("Loading messages...".to_string());
    }
    lines.extend(conversation.messages.iter().map(render_message));
    if sync.is_busy(&conversation.id) {
        lines.push("Assistant is typing...".to_string());
    }
    let draft = sync.draft();
    if !draft.is_empty() {
        lines.push(format!("(draft) {}", draft));
    }
    lines.join("\n")
}

pub fn render_message(message: &Message) -> String {
    let who = match message.sender {
        Sender::User => "You",
        Sender::Assistant => "Assistant",
        Sender::SystemError => "Error",
    };
    format!("[{}] {}: {}", message.display_timestamp, who, message.text)
}

pub fn render_notice(notice: &Notice) -> String {
    match &notice.conversation {
        Some(id) => format!("! {:?} ({}): {}", notice.kind, id, notice.message),
        None => format!("! {:?}: {}", notice.kind, notice.message),
    }
}
