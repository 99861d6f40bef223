// crates/engine/src/gateway/ollama.rs
use std::time::Duration;

use async_trait::async_trait;
use flux_shared::Tool;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{AssistantTurn, GatewayError, ModelGateway};
use crate::message::{Message, ToolCall};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Tool]>,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

/// Talks to an Ollama server's `/api/chat` endpoint without streaming.
#[derive(Clone)]
pub struct OllamaGateway {
    client: Client,
    url: String,
    model: String,
}

impl OllamaGateway {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelGateway for OllamaGateway {
    async fn respond(&self, history: &[Message], tools: &[Tool]) -> Result<AssistantTurn, GatewayError> {
        let request = ChatRequest {
            model: &self.model,
            messages: history,
            stream: false,
            tools: if tools.is_empty() { None } else { Some(tools) },
        };

        debug!(model = %self.model, messages = history.len(), tools = tools.len(), "calling ollama");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_response(&body)
    }
}

/// Decodes a non-streaming `/api/chat` body. Blank content becomes `None` and
/// calls without an id get a fresh `call_<uuid>` correlation id.
pub fn parse_response(body: &str) -> Result<AssistantTurn, GatewayError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| GatewayError::Malformed(e.to_string()))?;

    let content = response
        .message
        .content
        .filter(|c| !c.trim().is_empty());

    let tool_calls = response
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|mut call| {
            if call.id.is_empty() {
                call.id = format!("call_{}", Uuid::new_v4().simple());
            }
            call
        })
        .collect();

    Ok(AssistantTurn { content, tool_calls })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::TurnKind;
    use serde_json::json;

    #[test]
    fn plain_reply_is_text_turn() {
        let turn = parse_response(
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hi! How can I help?"},"done":true}"#,
        )
        .unwrap();

        assert_eq!(turn, AssistantTurn::text("Hi! How can I help?"));
    }

    #[test]
    fn tool_calls_get_unique_ids() {
        let body = json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    { "function": { "name": "list-repositories", "arguments": {} } },
                    { "function": { "name": "get-readme", "arguments": { "repoName": "Flux" } } }
                ]
            },
            "done": true
        })
        .to_string();

        let turn = parse_response(&body).unwrap();

        assert_eq!(turn.kind(), TurnKind::ToolCalls);
        assert_eq!(turn.content, None);
        assert!(turn.tool_calls.iter().all(|c| c.id.starts_with("call_")));
        assert_ne!(turn.tool_calls[0].id, turn.tool_calls[1].id);
    }

    #[test]
    fn backend_ids_are_kept() {
        let body = json!({
            "message": {
                "role": "assistant",
                "tool_calls": [{ "id": "abc", "function": { "name": "get-readme", "arguments": {} } }]
            }
        })
        .to_string();

        assert_eq!(parse_response(&body).unwrap().tool_calls[0].id, "abc");
    }

    #[test]
    fn undecodable_body_is_malformed() {
        let err = parse_response("<html>bad gateway</html>").unwrap_err();

        assert!(matches!(err, GatewayError::Malformed(_)));
    }

    #[test]
    fn request_omits_empty_manifest() {
        let history = vec![Message::user("hey")];
        let request = ChatRequest {
            model: "llama3.2",
            messages: &history,
            stream: false,
            tools: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("tools").is_none());
        assert_eq!(value["messages"][0]["role"], "user");
    }
}
