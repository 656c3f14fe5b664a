use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::models::{ConversationId, RemoteId};
use crate::remote::{
    ConversationService, ConversationSummary, RemoteMessage, SendRequest, SendResponse,
    ServiceError,
};
use crate::services::loader::HistoryFetch;

/// A remote operation on conversation metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOp {
    Rename(RemoteId, String),
    SetPinned(RemoteId, bool),
    Delete(RemoteId),
}

/// Result of a finished remote call, handed back to the coordinator to be
/// validated against the store as it is now.
#[derive(Debug)]
pub enum Completion {
    Listed(Result<Vec<ConversationSummary>, ServiceError>),
    HistoryLoaded {
        fetch: HistoryFetch,
        result: Result<Vec<RemoteMessage>, ServiceError>,
    },
    Sent {
        target: ConversationId,
        ticket: u64,
        result: Result<SendResponse, ServiceError>,
    },
    Mutated {
        mutation_id: u64,
        result: Result<(), ServiceError>,
    },
}

/// Run a remote call in the background and post its completion. Remote
/// calls are never cancelled; whoever applies the completion re-validates.
pub fn dispatch<F>(tx: &mpsc::UnboundedSender<Completion>, call: F)
where
    F: Future<Output = Completion> + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        let completion = call.await;
        if tx.send(completion).is_err() {
            tracing::debug!("Coordinator gone; discarding completion");
        }
    });
}

pub async fn list_conversations(service: Arc<dyn ConversationService>, user_id: String) -> Completion {
    Completion::Listed(service.list_conversations(&user_id).await)
}

pub async fn fetch_history(service: Arc<dyn ConversationService>, fetch: HistoryFetch) -> Completion {
    let result = service.get_messages(&fetch.id).await;
    Completion::HistoryLoaded { fetch, result }
}

pub async fn send_message(
    service: Arc<dyn ConversationService>,
    target: ConversationId,
    ticket: u64,
    text: String,
) -> Completion {
    let request = SendRequest {
        conversation_id: target.as_remote().cloned(),
        text,
    };
    let result = service.send_message(request).await;
    Completion::Sent {
        target,
        ticket,
        result,
    }
}

pub async fn run_mutation(
    service: Arc<dyn ConversationService>,
    mutation_id: u64,
    op: RemoteOp,
) -> Completion {
    let result = match &op {
        RemoteOp::Rename(id, title) => service.rename_conversation(id, title).await,
        RemoteOp::SetPinned(id, pinned) => service.set_pinned(id, *pinned).await,
        RemoteOp::Delete(id) => service.delete_conversation(id).await,
    };
    Completion::Mutated { mutation_id, result }
}
