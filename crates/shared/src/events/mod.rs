use serde::{Deserialize, Serialize};

/// Progress of one turn, streamed to clients as server-sent events.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    ToolCall {
        id: String,
        tool: String,
        args: serde_json::Value,
    },
    ToolResult {
        id: String,
        tool: String,
        result: String,
        truncated: bool,
    },
    ResponseComplete {
        content: String,
        status: String,
    },
    Done {
        session_id: String,
    },
    Error {
        message: String,
    },
}
