use crate::turn::{ChatMessageInput, InputRole};

/// Render the previous messages as a transcript for the retrieval/LLM call, one
/// `Human: ` or `Assistant: ` line per message.
pub fn format_history(messages: &[ChatMessageInput]) -> String {
    messages
        .iter()
        .map(|message| match message.role {
            InputRole::User => format!("Human: {}", message.content),
            _ => format!("Assistant: {}", message.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
