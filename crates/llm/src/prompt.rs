//! Prompt assembly
//!
//! System instructions are hard-capped, retrieved context is appended to
//! the system turn, and history is bounded to the most recent turns.

use opsvoice_core::{recent_history, ChatMessage, MAX_HISTORY_TURNS};

/// System prompt (including appended context) is capped at this many chars
pub const SYSTEM_PROMPT_CAP: usize = 12_000;

/// Inputs for one generation call
#[derive(Debug, Clone, Default)]
pub struct PromptInputs {
    pub system_prompt: String,
    /// Formatted instruction context block, possibly empty
    pub context_block: String,
    pub history: Vec<ChatMessage>,
    pub user_message: String,
}

/// Assemble the message list for the chat backends
pub fn build_messages(inputs: &PromptInputs) -> Vec<ChatMessage> {
    let mut system = inputs.system_prompt.clone();
    if !inputs.context_block.is_empty() {
        system.push_str("\n\nRelevant business knowledge:\n");
        system.push_str(&inputs.context_block);
    }
    let system = cap_chars(system, SYSTEM_PROMPT_CAP);

    let mut messages = Vec::with_capacity(inputs.history.len().min(MAX_HISTORY_TURNS) + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(recent_history(&inputs.history, MAX_HISTORY_TURNS).iter().cloned());
    messages.push(ChatMessage::user(inputs.user_message.clone()));
    messages
}

fn cap_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsvoice_core::ChatRole;

    #[test]
    fn test_system_prompt_is_capped() {
        let inputs = PromptInputs {
            system_prompt: "s".repeat(50_000),
            ..Default::default()
        };
        let messages = build_messages(&inputs);
        assert_eq!(messages[0].content.chars().count(), SYSTEM_PROMPT_CAP);
    }

    #[test]
    fn test_context_block_lands_in_system_turn() {
        let inputs = PromptInputs {
            system_prompt: "You are an operations assistant.".to_string(),
            context_block: "### Escalation\npage the lead".to_string(),
            user_message: "who do I page?".to_string(),
            ..Default::default()
        };
        let messages = build_messages(&inputs);
        assert!(messages[0].content.contains("Relevant business knowledge"));
        assert!(messages[0].content.contains("### Escalation"));
    }

    #[test]
    fn test_history_capped_and_user_message_last() {
        let history: Vec<ChatMessage> = (0..60)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("q{i}"))
                } else {
                    ChatMessage::assistant(format!("a{i}"))
                }
            })
            .collect();
        let inputs = PromptInputs {
            system_prompt: "sys".to_string(),
            history,
            user_message: "current".to_string(),
            ..Default::default()
        };
        let messages = build_messages(&inputs);
        // system + 20 history + current user message
        assert_eq!(messages.len(), 22);
        assert_eq!(messages[1].content, "q40");
        let last = messages.last().unwrap();
        assert_eq!(last.role, ChatRole::User);
        assert_eq!(last.content, "current");
    }
}
