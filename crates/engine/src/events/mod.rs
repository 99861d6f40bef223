use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

pub use flux_shared::events::ChatEvent;

const DISPLAY_LIMIT: usize = 500;

/// Events buffered per request before a slow reader starts missing them.
pub const EVENT_BUFFER: usize = 1024;

// Per-request broadcasters, keyed by request id
static EVENT_CHANNELS: Lazy<Mutex<HashMap<String, broadcast::Sender<ChatEvent>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Create a new event channel for a request
pub fn create_channel(id: String) -> broadcast::Receiver<ChatEvent> {
    let (tx, rx) = broadcast::channel(EVENT_BUFFER);
    EVENT_CHANNELS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, tx);
    rx
}

/// Send an event to a specific channel
pub fn send_event(id: &str, event: ChatEvent) {
    let channels = EVENT_CHANNELS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(tx) = channels.get(id) {
        let _ = tx.send(event); // Ignore if no receivers
    }
}

/// Clean up a channel when done
pub fn cleanup_channel(id: &str) {
    EVENT_CHANNELS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(id);
}

/// Handle the orchestrator uses to report progress of one request.
#[derive(Clone, Debug)]
pub struct EventSender {
    request_id: String,
}

impl EventSender {
    pub fn new(request_id: String) -> Self {
        Self { request_id }
    }

    pub fn tool_call(&self, id: &str, tool: &str, args: serde_json::Value) {
        send_event(&self.request_id, ChatEvent::ToolCall {
            id: id.to_string(),
            tool: tool.to_string(),
            args,
        });
    }

    pub fn tool_result(&self, id: &str, tool: &str, result: &str) {
        let total = result.chars().count();
        let truncated = total > DISPLAY_LIMIT;
        let display_result = if truncated {
            let head: String = result.chars().take(DISPLAY_LIMIT).collect();
            format!("{}... ({} chars total)", head, total)
        } else {
            result.to_string()
        };

        send_event(&self.request_id, ChatEvent::ToolResult {
            id: id.to_string(),
            tool: tool.to_string(),
            result: display_result,
            truncated,
        });
    }

    pub fn response_complete(&self, content: &str, status: &str) {
        send_event(&self.request_id, ChatEvent::ResponseComplete {
            content: content.to_string(),
            status: status.to_string(),
        });
    }

    pub fn complete(&self, session_id: &str) {
        send_event(&self.request_id, ChatEvent::Done {
            session_id: session_id.to_string(),
        });
        cleanup_channel(&self.request_id);
    }

    pub fn error(&self, message: String) {
        send_event(&self.request_id, ChatEvent::Error { message });
        cleanup_channel(&self.request_id);
    }
}
