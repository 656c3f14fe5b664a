use chrono::{DateTime, Local, Utc};

use crate::config::{DEFAULT_TITLE, TITLE_MAX_CHARS, TITLE_TRUNCATION_MARKER};

/// Derive a conversation title from the first message sent in it.
///
/// The first sentence wins when it fits; otherwise the message is cut to
/// [`TITLE_MAX_CHARS`] characters and marked as truncated. Blank input gets
/// the default title.
pub fn derive_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    let first_sentence = trimmed
        .split(['.', '!', '?'])
        .next()
        .unwrap_or_default()
        .trim_end();

    let title = if first_sentence.chars().count() > TITLE_MAX_CHARS {
        let head: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}{}", head, TITLE_TRUNCATION_MARKER)
    } else if !first_sentence.is_empty() {
        first_sentence.to_string()
    } else {
        trimmed.chars().take(TITLE_MAX_CHARS).collect()
    };

    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

/// Relative label for a conversation's last activity.
pub fn format_activity(at: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(*at);
    let minutes = elapsed.num_minutes();

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if elapsed.num_hours() < 24 {
        format!("{}h ago", elapsed.num_hours())
    } else if elapsed.num_hours() < 48 {
        "Yesterday".to_string()
    } else {
        at.with_timezone(&Local).format("%b %d").to_string()
    }
}

/// Clock label shown next to a message.
pub fn format_message_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_title_takes_first_sentence() {
        assert_eq!(derive_title("hello world. more text"), "hello world");
        assert_eq!(derive_title("What is my GPA? I need it"), "What is my GPA");
    }

    #[test]
    fn test_title_drops_space_before_punctuation() {
        assert_eq!(derive_title("What is my GPA ? thanks"), "What is my GPA");
    }

    #[test]
    fn test_title_truncates_long_sentence() {
        let text = "abcdefghij".repeat(4);
        assert_eq!(text.len(), 40);
        let title = derive_title(&text);
        assert_eq!(title, format!("{}...", &text[..30]));
    }

    #[test]
    fn test_title_for_blank_input() {
        assert_eq!(derive_title("   \t\n "), "New Chat");
        assert_eq!(derive_title(""), "New Chat");
    }

    #[test]
    fn test_title_when_text_starts_with_punctuation() {
        assert_eq!(derive_title("...and then?"), "...and then?");
    }

    #[test]
    fn test_title_counts_characters_not_bytes() {
        let text = "é".repeat(31);
        let title = derive_title(&text);
        assert_eq!(title.chars().count(), 33);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_activity_labels() {
        let now = Utc::now();
        assert_eq!(format_activity(&now, &now), "Just now");
        assert_eq!(format_activity(&(now - Duration::minutes(5)), &now), "5m ago");
        assert_eq!(format_activity(&(now - Duration::hours(3)), &now), "3h ago");
        assert_eq!(format_activity(&(now - Duration::hours(30)), &now), "Yesterday");
    }
}
