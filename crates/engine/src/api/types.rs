use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::orchestrator::TurnStatus;
use crate::policy::ToolAccess;

// Chat endpoint
#[derive(Deserialize, Debug)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub stream: Option<bool>,
}

#[derive(Serialize, Debug)]
pub struct ChatResponse {
    pub session_id: String,
    pub content: String,
    pub status: TurnStatus,
    pub rounds: u32,
    pub tool_access: ToolAccess,
}

// Tool manifest
#[derive(Serialize, Debug)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Serialize, Debug)]
pub struct ListToolsResponse {
    pub tools: Vec<ToolInfo>,
}

// Session history
#[derive(Serialize, Debug)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
}
