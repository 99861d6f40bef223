pub mod ollama;
pub mod scripted;

use async_trait::async_trait;
use flux_shared::Tool;
use thiserror::Error;

use crate::message::{Message, ToolCall};

pub use ollama::OllamaGateway;
pub use scripted::ScriptedGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("model backend unreachable: {0}")]
    Transport(String),
    #[error("model backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed model response: {0}")]
    Malformed(String),
}

/// What an assistant turn asks the orchestrator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Text,
    ToolCalls,
    /// Tool calls accompanied by prose; the calls take precedence.
    Mixed,
}

/// One model response, already split into prose and structured calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantTurn {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn kind(&self) -> TurnKind {
        let has_text = self.content.as_deref().is_some_and(|c| !c.trim().is_empty());
        match (self.tool_calls.is_empty(), has_text) {
            (true, _) => TurnKind::Text,
            (false, false) => TurnKind::ToolCalls,
            (false, true) => TurnKind::Mixed,
        }
    }

    /// The history entry recording this turn's tool requests.
    pub fn into_message(self) -> Message {
        Message::assistant_calls(self.content, self.tool_calls)
    }
}

/// Boundary to the language model. Implementations must not have side
/// effects: every action happens through the orchestrator's tool dispatch.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn respond(&self, history: &[Message], tools: &[Tool]) -> Result<AssistantTurn, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_distinguishes_text_calls_and_both() {
        let call = ToolCall::new("c1", "list-repositories", json!({}));

        assert_eq!(AssistantTurn::text("hello").kind(), TurnKind::Text);
        assert_eq!(AssistantTurn::calls(vec![call.clone()]).kind(), TurnKind::ToolCalls);
        assert_eq!(
            AssistantTurn::calls(vec![call.clone()]).with_content("  ").kind(),
            TurnKind::ToolCalls
        );
        assert_eq!(
            AssistantTurn::calls(vec![call]).with_content("Let me check.").kind(),
            TurnKind::Mixed
        );
    }
}
