use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{DEFAULT_TITLE, NEW_CONVERSATION_PREVIEW};
use crate::models::{Conversation, ConversationId, LoadState, Message, RemoteId, Sender};
use crate::remote::{ConversationService, ConversationSummary, SendResponse, ServiceError};
use crate::services::chat::{self, Completion, RemoteOp};
use crate::services::conversation::{derive_title, format_message_time};
use crate::services::drafts::{DraftCache, DraftKey};
use crate::services::loader::{LoadOutcome, MessageLoader};
use crate::services::ordering;
use crate::services::store::{ConversationStore, StoreSnapshot};

/// Why a user action was refused. Nothing has changed when one is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Conversation not found: {0}")]
    UnknownConversation(ConversationId),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Title is empty")]
    EmptyTitle,

    #[error("Still waiting for a reply in {0}")]
    Busy(ConversationId),

    #[error("No user to list conversations for")]
    MissingUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    SendFailed,
    RenameReverted,
    PinReverted,
    DeleteReverted,
    HistoryFailed,
    ListingFailed,
}

/// A contained failure the presentation layer may want to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub conversation: Option<ConversationId>,
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug)]
enum MutationKind {
    Rename,
    Pin,
    Delete {
        was_active: bool,
        // send results that arrived while the conversation was hidden
        deferred: Vec<Completion>,
    },
}

impl MutationKind {
    fn label(&self) -> &'static str {
        match self {
            MutationKind::Rename => "Rename",
            MutationKind::Pin => "Pin",
            MutationKind::Delete { .. } => "Delete",
        }
    }

    fn field(&self) -> Option<Field> {
        match self {
            MutationKind::Rename => Some(Field::Title),
            MutationKind::Pin => Some(Field::Pinned),
            MutationKind::Delete { .. } => None,
        }
    }
}

#[derive(Debug)]
struct PendingMutation {
    kind: MutationKind,
    id: RemoteId,
    snapshot: StoreSnapshot,
    applied_revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Title,
    Pinned,
}

#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Title(String),
    Pinned(bool),
}

impl FieldValue {
    fn read(field: Field, conversation: &Conversation) -> Self {
        match field {
            Field::Title => FieldValue::Title(conversation.title.clone()),
            Field::Pinned => FieldValue::Pinned(conversation.pinned),
        }
    }

    fn write(self, conversation: &mut Conversation) {
        match self {
            FieldValue::Title(title) => conversation.title = title,
            FieldValue::Pinned(pinned) => conversation.pinned = pinned,
        }
    }
}

#[derive(Debug)]
struct FieldWrite {
    mutation_id: u64,
    value: FieldValue,
    confirmed: bool,
}

/// Unsettled optimistic writes to one field of one conversation, oldest
/// first. The field should always show the newest write that has not
/// failed, or `base` when there is none.
#[derive(Debug)]
struct FieldWrites {
    // last value the service is known to hold
    base: FieldValue,
    writes: Vec<FieldWrite>,
}

impl FieldWrites {
    fn new(base: FieldValue) -> Self {
        Self {
            base,
            writes: Vec::new(),
        }
    }

    fn push(&mut self, mutation_id: u64, value: FieldValue) {
        self.writes.push(FieldWrite {
            mutation_id,
            value,
            confirmed: false,
        });
    }

    fn current(&self) -> FieldValue {
        self.writes
            .last()
            .map_or_else(|| self.base.clone(), |w| w.value.clone())
    }

    fn confirm(&mut self, mutation_id: u64) {
        if let Some(write) = self.writes.iter_mut().find(|w| w.mutation_id == mutation_id) {
            write.confirmed = true;
        }
        self.compact();
    }

    /// Drop a failed write and return the value the field should now show.
    fn fail(&mut self, mutation_id: u64) -> FieldValue {
        self.writes.retain(|w| w.mutation_id != mutation_id);
        let current = self.current();
        self.compact();
        current
    }

    fn compact(&mut self) {
        while self.writes.first().is_some_and(|w| w.confirmed) {
            self.base = self.writes.remove(0).value;
        }
    }

    fn is_settled(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Drives every user action as optimistic apply, remote call, then
/// reconcile or roll back.
///
/// Actions return as soon as the optimistic change is in the store and
/// spawn their remote call on the current Tokio runtime. Results come back
/// as [`Completion`]s that the owner feeds to [`SyncCoordinator::apply`],
/// either directly or through [`SyncCoordinator::process_next`].
pub struct SyncCoordinator {
    service: Arc<dyn ConversationService>,
    user_id: Option<String>,
    store: ConversationStore,
    drafts: DraftCache,
    loader: MessageLoader,
    active: Option<ConversationId>,
    // conversation -> ticket of the Send it is waiting on
    busy: HashMap<ConversationId, u64>,
    pending: HashMap<u64, PendingMutation>,
    field_writes: HashMap<(RemoteId, Field), FieldWrites>,
    pending_deletes: HashSet<RemoteId>,
    next_ticket: u64,
    next_message_seq: u64,
    initial_loading: bool,
    notices: Vec<Notice>,
    in_flight: usize,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl SyncCoordinator {
    pub fn new(service: Arc<dyn ConversationService>, user_id: Option<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            service,
            user_id,
            store: ConversationStore::new(),
            drafts: DraftCache::new(),
            loader: MessageLoader::new(),
            active: None,
            busy: HashMap::new(),
            pending: HashMap::new(),
            field_writes: HashMap::new(),
            pending_deletes: HashSet::new(),
            next_ticket: 0,
            next_message_seq: 0,
            initial_loading: false,
            notices: Vec::new(),
            in_flight: 0,
            tx,
            rx,
        }
    }

    // --- Queries ---

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// All conversations, pinned first.
    pub fn conversations(&self) -> Vec<&Conversation> {
        ordering::pinned_first(self.store.list())
    }

    pub fn filtered_conversations(&self, query: &str) -> Vec<&Conversation> {
        ordering::filter(self.conversations(), query)
    }

    pub fn active_id(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.as_ref().and_then(|id| self.store.get(id))
    }

    pub fn active_messages(&self) -> &[Message] {
        self.active_conversation()
            .map(|c| c.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_busy(&self, id: &ConversationId) -> bool {
        self.busy.contains_key(id)
    }

    pub fn is_loading_history(&self, id: &ConversationId) -> bool {
        id.as_remote().is_some_and(|r| self.loader.is_loading(r))
    }

    pub fn is_initial_loading(&self) -> bool {
        self.initial_loading
    }

    /// Composer text for whatever is selected right now.
    pub fn draft(&self) -> &str {
        self.drafts.get(&self.draft_key())
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Whether any remote call has not been applied yet.
    pub fn has_pending(&self) -> bool {
        self.in_flight > 0
    }

    // --- Actions ---

    pub fn refresh_conversations(&mut self) -> Result<(), SyncError> {
        let user_id = self.user_id.clone().ok_or(SyncError::MissingUser)?;
        self.initial_loading = true;
        let call = chat::list_conversations(self.service.clone(), user_id);
        self.spawn(call);
        Ok(())
    }

    /// Start an empty conversation and select it. The service learns about
    /// it with its first message.
    pub fn new_conversation(&mut self) -> ConversationId {
        let conversation = Conversation::new_local(
            DEFAULT_TITLE.to_string(),
            NEW_CONVERSATION_PREVIEW.to_string(),
            Utc::now(),
        );
        let id = conversation.id.clone();
        self.store.insert_front(conversation);
        self.active = Some(id.clone());
        tracing::debug!("Created conversation {}", id);
        id
    }

    pub fn select_conversation(&mut self, id: &ConversationId) -> Result<(), SyncError> {
        if !self.store.contains(id) {
            return Err(SyncError::UnknownConversation(id.clone()));
        }
        self.active = Some(id.clone());

        if let Some(fetch) = self.loader.begin(&mut self.store, id) {
            let call = chat::fetch_history(self.service.clone(), fetch);
            self.spawn(call);
        }
        Ok(())
    }

    pub fn update_draft(&mut self, text: &str) {
        let key = self.draft_key();
        self.drafts.set(key, text.to_string());
    }

    /// Send `text` to the active conversation, creating one if nothing is
    /// selected. Returns the id the message was appended under.
    pub fn send_message(&mut self, text: &str) -> Result<ConversationId, SyncError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::EmptyMessage);
        }

        let draft_key = self.draft_key();
        let now = Utc::now();

        let target = match self.active.clone().filter(|id| self.store.contains(id)) {
            Some(id) => {
                if self.busy.contains_key(&id) {
                    return Err(SyncError::Busy(id));
                }
                id
            }
            None => {
                let conversation =
                    Conversation::new_local(derive_title(text), text.to_string(), now);
                let id = conversation.id.clone();
                self.store.insert_front(conversation);
                self.active = Some(id.clone());
                tracing::debug!("Created conversation {} for first message", id);
                id
            }
        };

        let user_message = Message::new(
            self.local_message_id("user", &now),
            text.to_string(),
            Sender::User,
            format_message_time(&now),
        );
        let retitle = target.is_local()
            && self
                .store
                .get(&target)
                .is_some_and(|c| c.messages.is_empty());

        self.store.append_messages(&target, vec![user_message]);
        self.store.update(&target, |c| {
            if retitle {
                c.title = derive_title(text);
            }
            c.last_message_preview = text.to_string();
            c.last_activity = now;
        });
        self.drafts.clear(&draft_key);

        let ticket = self.take_ticket();
        self.busy.insert(target.clone(), ticket);

        let call = chat::send_message(self.service.clone(), target.clone(), ticket, text.to_string());
        self.spawn(call);
        Ok(target)
    }

    pub fn rename_conversation(&mut self, id: &ConversationId, title: &str) -> Result<(), SyncError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SyncError::EmptyTitle);
        }
        if !self.store.contains(id) {
            return Err(SyncError::UnknownConversation(id.clone()));
        }

        let snapshot = self.store.snapshot();
        self.store.update(id, |c| c.title = title.to_string());

        if let Some(remote) = id.as_remote() {
            let op = RemoteOp::Rename(remote.clone(), title.to_string());
            self.begin_mutation(MutationKind::Rename, remote.clone(), snapshot, op);
        }
        Ok(())
    }

    /// Flip the pinned flag. Returns the new value.
    pub fn toggle_pin(&mut self, id: &ConversationId) -> Result<bool, SyncError> {
        let pinned = match self.store.get(id) {
            Some(c) => !c.pinned,
            None => return Err(SyncError::UnknownConversation(id.clone())),
        };

        let snapshot = self.store.snapshot();
        self.store.update(id, |c| c.pinned = pinned);

        if let Some(remote) = id.as_remote() {
            let op = RemoteOp::SetPinned(remote.clone(), pinned);
            self.begin_mutation(MutationKind::Pin, remote.clone(), snapshot, op);
        }
        Ok(pinned)
    }

    pub fn delete_conversation(&mut self, id: &ConversationId) -> Result<(), SyncError> {
        if !self.store.contains(id) {
            return Err(SyncError::UnknownConversation(id.clone()));
        }

        let snapshot = self.store.snapshot();
        self.store.remove(id);
        let was_active = self.active.as_ref() == Some(id);
        if was_active {
            self.active = None;
        }

        match id.as_remote() {
            Some(remote) => {
                self.pending_deletes.insert(remote.clone());
                let op = RemoteOp::Delete(remote.clone());
                let kind = MutationKind::Delete {
                    was_active,
                    deferred: Vec::new(),
                };
                self.begin_mutation(kind, remote.clone(), snapshot, op);
            }
            None => {
                self.drafts.remove_conversation(id);
                tracing::debug!("Deleted local conversation {}", id);
            }
        }
        Ok(())
    }

    // --- Completion loop ---

    /// Wait for the next finished remote call. `None` when nothing is in
    /// flight.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.rx.recv().await;
        if completion.is_some() {
            self.in_flight -= 1;
        }
        completion
    }

    /// Apply one completion if any call is outstanding.
    pub async fn process_next(&mut self) -> bool {
        match self.next_completion().await {
            Some(completion) => {
                self.apply(completion);
                true
            }
            None => false,
        }
    }

    /// Apply completions until nothing is in flight.
    pub async fn settle(&mut self) {
        while self.process_next().await {}
    }

    /// Reconcile one finished remote call against the store as it is now.
    pub fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Listed(result) => self.apply_listing(result),
            Completion::HistoryLoaded { fetch, result } => {
                let id = ConversationId::Remote(fetch.id.clone());
                if let LoadOutcome::Failed(message) = self.loader.complete(&mut self.store, fetch, result) {
                    self.notify(Some(id), NoticeKind::HistoryFailed, message);
                }
            }
            Completion::Sent {
                target,
                ticket,
                result,
            } => self.apply_send(target, ticket, result),
            Completion::Mutated {
                mutation_id,
                result,
            } => self.apply_mutation(mutation_id, result),
        }
    }

    fn apply_listing(&mut self, result: Result<Vec<ConversationSummary>, ServiceError>) {
        self.initial_loading = false;
        let summaries = match result {
            Ok(summaries) => summaries,
            Err(e) => {
                tracing::error!("Failed to load conversations: {}", e);
                self.notify(None, NoticeKind::ListingFailed, e.to_string());
                return;
            }
        };

        let mutating: HashSet<RemoteId> = self.pending.values().map(|m| m.id.clone()).collect();
        let mut added = 0;
        for summary in summaries {
            if self.pending_deletes.contains(&summary.id) {
                continue;
            }
            let id = ConversationId::Remote(summary.id.clone());
            if self.store.contains(&id) {
                if mutating.contains(&summary.id) {
                    continue;
                }
                self.store.update(&id, |c| {
                    c.title = summary.title;
                    c.pinned = summary.pinned;
                    c.last_activity = c.last_activity.max(summary.last_activity);
                });
            } else {
                self.store.upsert(Conversation::from_listing(
                    summary.id,
                    summary.title,
                    summary.pinned,
                    summary.last_activity,
                ));
                added += 1;
            }
        }
        tracing::info!("Loaded conversation list ({} new)", added);
    }

    fn apply_send(
        &mut self,
        target: ConversationId,
        ticket: u64,
        result: Result<SendResponse, ServiceError>,
    ) {
        if !self.store.contains(&target) {
            if let Some(remote) = target.as_remote().cloned() {
                if let Some(deferred) = self.deferred_sends(&remote) {
                    tracing::debug!("Holding send result for {} until its delete settles", target);
                    deferred.push(Completion::Sent {
                        target,
                        ticket,
                        result,
                    });
                    return;
                }
            }
            self.release_busy(&target, ticket);
            match &result {
                Ok(response) if target.is_local() => tracing::warn!(
                    "Conversation {} was deleted before the service created {}",
                    target,
                    response.conversation_id
                ),
                _ => tracing::debug!("Dropping send result for deleted conversation {}", target),
            }
            return;
        }

        let now = Utc::now();
        match result {
            Ok(response) => {
                let current = self.reconcile_id(&target, response.conversation_id);
                let replies: Vec<Message> = response
                    .replies
                    .into_iter()
                    .enumerate()
                    .map(|(i, reply)| {
                        Message::new(
                            format!("{}-{}-{}", current, now.timestamp_millis(), i),
                            reply.content,
                            Sender::Assistant,
                            format_message_time(&now),
                        )
                    })
                    .collect();
                let preview = replies.last().map(|m| m.text.clone());

                self.store.append_messages(&current, replies);
                self.store.update(&current, |c| {
                    if let Some(preview) = preview {
                        c.last_message_preview = preview;
                    }
                    c.last_activity = now;
                });
                self.release_busy(&current, ticket);
            }
            Err(e) => {
                tracing::error!("Failed to send message in {}: {}", target, e);
                let error_message = Message::new(
                    self.local_message_id("error", &now),
                    e.to_string(),
                    Sender::SystemError,
                    format_message_time(&now),
                );
                self.store.append_messages(&target, vec![error_message]);
                self.notify(Some(target.clone()), NoticeKind::SendFailed, e.to_string());
                self.release_busy(&target, ticket);
            }
        }
    }

    /// Promote a local target to the id the service assigned, moving every
    /// id-keyed reference along with it.
    fn reconcile_id(&mut self, target: &ConversationId, assigned: RemoteId) -> ConversationId {
        match target {
            ConversationId::Local(_) => {
                let promoted = ConversationId::Remote(assigned.clone());
                if !self.store.promote_id(target, assigned) {
                    tracing::warn!("Could not promote {} to {}", target, promoted);
                    return target.clone();
                }
                if self.active.as_ref() == Some(target) {
                    self.active = Some(promoted.clone());
                }
                if let Some(ticket) = self.busy.remove(target) {
                    self.busy.insert(promoted.clone(), ticket);
                }
                self.drafts.rekey(target, &promoted);
                tracing::info!("Promoted conversation {} to {}", target, promoted);
                promoted
            }
            ConversationId::Remote(id) => {
                if *id != assigned {
                    tracing::warn!("Service answered {} for conversation {}", assigned, id);
                }
                target.clone()
            }
        }
    }

    fn apply_mutation(&mut self, mutation_id: u64, result: Result<(), ServiceError>) {
        let Some(mutation) = self.pending.remove(&mutation_id) else {
            tracing::debug!("Ignoring unknown mutation {}", mutation_id);
            return;
        };
        let id = ConversationId::Remote(mutation.id.clone());
        let label = mutation.kind.label();

        if let MutationKind::Delete { .. } = mutation.kind {
            self.pending_deletes.remove(&mutation.id);
        }

        match result {
            Ok(()) => {
                match mutation.kind {
                    MutationKind::Delete { deferred, .. } => {
                        self.drafts.remove_conversation(&id);
                        for completion in deferred {
                            if let Completion::Sent { target, ticket, .. } = completion {
                                self.release_busy(&target, ticket);
                            }
                        }
                    }
                    kind => {
                        if let Some(field) = kind.field() {
                            let key = (mutation.id.clone(), field);
                            if let Some(writes) = self.field_writes.get_mut(&key) {
                                writes.confirm(mutation_id);
                                if writes.is_settled() {
                                    self.field_writes.remove(&key);
                                }
                            }
                        }
                    }
                }
                tracing::debug!("Confirmed {} on {}", label, id);
            }
            Err(e) => {
                tracing::error!("{} on {} failed, rolling back: {}", label, id, e);
                let kind = match mutation.kind {
                    MutationKind::Rename => NoticeKind::RenameReverted,
                    MutationKind::Pin => NoticeKind::PinReverted,
                    MutationKind::Delete { .. } => NoticeKind::DeleteReverted,
                };
                self.roll_back(mutation_id, mutation);
                self.notify(Some(id), kind, e.to_string());
            }
        }
    }

    /// Undo a failed mutation.
    ///
    /// A rename or pin puts its field back to the newest write on it that
    /// has not failed, so overlapping writes settle on what the service
    /// holds. When this was the only write and nothing touched the store
    /// since, the whole snapshot is restored instead. A delete puts the
    /// conversation back where it was and replays any send result held for
    /// it.
    fn roll_back(&mut self, mutation_id: u64, mutation: PendingMutation) {
        let PendingMutation {
            kind,
            id: remote,
            snapshot,
            applied_revision,
        } = mutation;
        let id = ConversationId::Remote(remote.clone());
        let untouched = self.store.revision() == applied_revision;

        match kind {
            MutationKind::Rename | MutationKind::Pin => {
                let Some(field) = kind.field() else {
                    return;
                };
                let key = (remote, field);
                let Some(writes) = self.field_writes.get_mut(&key) else {
                    return;
                };
                let only_write = writes.writes.len() == 1;
                let value = writes.fail(mutation_id);
                if writes.is_settled() {
                    self.field_writes.remove(&key);
                }

                if only_write && untouched {
                    self.store.restore(snapshot);
                } else {
                    self.store.update(&id, |c| value.write(c));
                }
            }
            MutationKind::Delete {
                was_active,
                deferred,
            } => {
                if untouched {
                    self.store.restore(snapshot);
                } else {
                    self.store.reinsert_from(&snapshot, &id);
                }
                if was_active && self.active.is_none() && self.store.contains(&id) {
                    self.active = Some(id);
                }
                self.reset_orphaned_loads();
                for completion in deferred {
                    self.apply(completion);
                }
            }
        }
    }

    /// A restored conversation can still say `Loading` for a fetch that was
    /// dropped while it was gone. Nothing would ever finish it.
    fn reset_orphaned_loads(&mut self) {
        let orphaned: Vec<ConversationId> = self
            .store
            .list()
            .iter()
            .filter(|c| c.load_state == LoadState::Loading)
            .filter(|c| c.id.as_remote().is_some_and(|r| !self.loader.is_loading(r)))
            .map(|c| c.id.clone())
            .collect();
        for id in orphaned {
            tracing::debug!("No fetch in flight for {}; marking it not loaded", id);
            self.store.set_load_state(&id, LoadState::NotLoaded);
        }
    }

    // --- Helpers ---

    fn begin_mutation(
        &mut self,
        kind: MutationKind,
        id: RemoteId,
        snapshot: StoreSnapshot,
        op: RemoteOp,
    ) {
        let mutation_id = self.take_ticket();
        if let Some(field) = kind.field() {
            let key = ConversationId::Remote(id.clone());
            if let (Some(before), Some(after)) = (snapshot.get(&key), self.store.get(&key)) {
                self.field_writes
                    .entry((id.clone(), field))
                    .or_insert_with(|| FieldWrites::new(FieldValue::read(field, before)))
                    .push(mutation_id, FieldValue::read(field, after));
            }
        }
        self.pending.insert(
            mutation_id,
            PendingMutation {
                kind,
                id,
                snapshot,
                applied_revision: self.store.revision(),
            },
        );
        let call = chat::run_mutation(self.service.clone(), mutation_id, op);
        self.spawn(call);
    }

    fn spawn<F>(&mut self, call: F)
    where
        F: std::future::Future<Output = Completion> + Send + 'static,
    {
        self.in_flight += 1;
        chat::dispatch(&self.tx, call);
    }

    fn deferred_sends(&mut self, id: &RemoteId) -> Option<&mut Vec<Completion>> {
        self.pending.values_mut().find_map(|m| {
            if m.id != *id {
                return None;
            }
            match &mut m.kind {
                MutationKind::Delete { deferred, .. } => Some(deferred),
                _ => None,
            }
        })
    }

    fn release_busy(&mut self, id: &ConversationId, ticket: u64) {
        if self.busy.get(id) == Some(&ticket) {
            self.busy.remove(id);
        }
    }

    fn take_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn local_message_id(&mut self, kind: &str, now: &DateTime<Utc>) -> String {
        self.next_message_seq += 1;
        format!("{}-{}-{}", kind, now.timestamp_millis(), self.next_message_seq)
    }

    fn draft_key(&self) -> DraftKey {
        DraftKey::from(self.active.as_ref())
    }

    fn notify(&mut self, conversation: Option<ConversationId>, kind: NoticeKind, message: String) {
        self.notices.push(Notice {
            conversation,
            kind,
            message,
        });
    }
}
