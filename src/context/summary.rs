// src/context/summary.rs
// Deterministic stand-in for conversation turns that no longer fit the window

use crate::session::{Message, MessageRole};

/// Hard cap on summary length in characters, so its cost is known before filling history
pub const SUMMARY_MAX_CHARS: usize = 600;

/// Per-message snippet length inside the summary
const SNIPPET_CHARS: usize = 120;

fn snippet(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(SNIPPET_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

fn label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "User",
        MessageRole::Assistant => "Assistant",
        MessageRole::System => "System",
        MessageRole::Error => "Error",
    }
}

/// Summarize trimmed messages (given oldest first), newest lines first.
///
/// Output never exceeds [`SUMMARY_MAX_CHARS`] characters and depends only on the input.
pub fn summarize_trimmed(trimmed: &[Message]) -> String {
    let mut summary = format!(
        "[Summary of {} earlier message{} omitted for length]",
        trimmed.len(),
        if trimmed.len() == 1 { "" } else { "s" }
    );
    let mut used = summary.chars().count();

    for message in trimmed.iter().rev() {
        let line = format!("\n- {}: {}", label(message.role), snippet(&message.content));
        let cost = line.chars().count();
        if used + cost > SUMMARY_MAX_CHARS {
            break;
        }
        used += cost;
        summary.push_str(&line);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: MessageRole, content: &str, at: i64) -> Message {
        Message {
            id: format!("m{}", at),
            session_id: "s".into(),
            role,
            content: content.into(),
            hidden_context: None,
            model: None,
            created_at: at,
        }
    }

    #[test]
    fn test_summary_header_counts_messages() {
        let trimmed = vec![
            msg(MessageRole::User, "first", 1),
            msg(MessageRole::Assistant, "second", 2),
        ];
        let summary = summarize_trimmed(&trimmed);
        assert!(summary.starts_with("[Summary of 2 earlier messages"));
        // newest trimmed message is listed first
        let second = summary.find("Assistant: second").unwrap();
        let first = summary.find("User: first").unwrap();
        assert!(second < first);
    }

    #[test]
    fn test_summary_respects_cap() {
        let long = "word ".repeat(500);
        let trimmed: Vec<Message> = (0..50)
            .map(|i| msg(MessageRole::User, &long, i))
            .collect();
        let summary = summarize_trimmed(&trimmed);
        assert!(summary.chars().count() <= SUMMARY_MAX_CHARS);
        assert!(summary.contains("50 earlier messages"));
    }

    #[test]
    fn test_summary_is_deterministic() {
        let trimmed = vec![msg(MessageRole::User, "reorder my clips", 1)];
        assert_eq!(summarize_trimmed(&trimmed), summarize_trimmed(&trimmed));
    }

    #[test]
    fn test_snippet_truncates_multibyte_safely() {
        let text = "é".repeat(300);
        let cut = snippet(&text);
        assert_eq!(cut.chars().count(), SNIPPET_CHARS);
        assert!(cut.ends_with("..."));
    }
}
