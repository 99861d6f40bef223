pub mod api;
pub mod config;
pub mod conversation;
pub mod events;
pub mod gateway;
pub mod guard;
pub mod memory;
pub mod message;
pub mod orchestrator;
pub mod policy;
pub mod sessions;
pub mod toolkit;

pub use message::{FunctionCall, Message, Role, ToolCall};
pub use orchestrator::{Orchestrator, OrchestratorConfig, TurnOutcome, TurnStatus};
