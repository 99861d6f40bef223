use crate::message::{Message, Role};

/// The dialogue of one session, oldest first. Append-only: nothing here
/// removes or rewrites an entry.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
        }
    }

    /// Resumes a stored transcript.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Appends `message` unless the tail already is an equivalent assistant
    /// message. Returns whether it was appended.
    pub fn append_unless_tail(&mut self, message: Message) -> bool {
        let duplicate = self.messages.last().is_some_and(|tail| {
            tail.role == Role::Assistant
                && tail.role == message.role
                && !tail.has_tool_calls()
                && tail.content == message.content
        });

        if duplicate {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages appended at or after `index`.
    pub fn since(&self, index: usize) -> &[Message] {
        &self.messages[index.min(self.messages.len())..]
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent non-blank assistant text that `accept` approves of.
    pub fn last_assistant_text(&self, accept: impl Fn(&str) -> bool) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .filter_map(Message::text)
            .find(|text| accept(text))
    }

    pub fn result_count(&self, call_id: &str) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some(call_id))
            .count()
    }

    pub fn has_result_for(&self, call_id: &str) -> bool {
        self.result_count(call_id) > 0
    }
}
