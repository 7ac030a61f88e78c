//! Conversation history types
//!
//! History is stored with `user`/`assistant` roles. Model APIs that expect
//! `model` terminology get the normalized form via [`ChatRole::model_name`].

use serde::{Deserialize, Serialize};

/// History passed to generation is capped to the most recent N turns
/// to bound token usage.
pub const MAX_HISTORY_TURNS: usize = 20;

/// Role of one conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    /// Role name for OpenAI-compatible chat APIs
    pub fn api_name(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    /// Role name for Gemini-style APIs, which use `model` for the
    /// assistant side
    pub fn model_name(&self) -> &'static str {
        match self {
            ChatRole::Assistant => "model",
            _ => "user",
        }
    }
}

/// One turn of conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Keep only the most recent `max_turns` entries of a history slice
pub fn recent_history(history: &[ChatMessage], max_turns: usize) -> &[ChatMessage] {
    let start = history.len().saturating_sub(max_turns);
    &history[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_normalization_for_model_apis() {
        assert_eq!(ChatRole::Assistant.model_name(), "model");
        assert_eq!(ChatRole::User.model_name(), "user");
        assert_eq!(ChatRole::Assistant.api_name(), "assistant");
    }

    #[test]
    fn test_recent_history_caps_to_last_n() {
        let history: Vec<ChatMessage> = (0..50)
            .map(|i| ChatMessage::user(format!("turn {i}")))
            .collect();
        let recent = recent_history(&history, MAX_HISTORY_TURNS);
        assert_eq!(recent.len(), MAX_HISTORY_TURNS);
        assert_eq!(recent[0].content, "turn 30");
        assert_eq!(recent.last().map(|m| m.content.as_str()), Some("turn 49"));
    }

    #[test]
    fn test_recent_history_shorter_than_cap() {
        let history = vec![ChatMessage::user("only one")];
        assert_eq!(recent_history(&history, MAX_HISTORY_TURNS).len(), 1);
    }
}
