use crate::models::Conversation;

/// Pinned conversations first, each group by most recent activity. Ties keep
/// the order the store holds them in.
pub fn pinned_first(conversations: &[Conversation]) -> Vec<&Conversation> {
    let mut ordered: Vec<&Conversation> = conversations.iter().collect();
    ordered.sort_by(|a, b| {
        b.pinned
            .cmp(&a.pinned)
            .then_with(|| b.last_activity.cmp(&a.last_activity))
    });
    ordered
}

/// Case-insensitive match on title or preview. An empty query keeps all.
pub fn filter<'a>(conversations: Vec<&'a Conversation>, query: &str) -> Vec<&'a Conversation> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return conversations;
    }
    conversations
        .into_iter()
        .filter(|c| {
            c.title.to_lowercase().contains(&query)
                || c.last_message_preview.to_lowercase().contains(&query)
        })
        .collect()
}
