//! The per-session turn loop.
//!
//! A turn runs `AwaitingInput -> Thinking -> (Dispatching -> Thinking)* ->
//! Presenting -> AwaitingInput`. Tool failures are written into the history
//! for the model to handle; only gateway failures end a turn early.

use std::sync::Arc;

use flux_shared::{Tool, ToolError, ToolRegistry};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::conversation::ConversationState;
use crate::events::EventSender;
use crate::gateway::{GatewayError, ModelGateway, TurnKind};
use crate::guard::{DEFAULT_MAX_ROUNDS, LoopGuard};
use crate::message::{Message, ToolCall};
use crate::policy::{LeakageGuard, PolicyConfig, ToolAccess, TurnPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingInput,
    Thinking,
    Dispatching,
    Presenting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Answered,
    /// The model's final text was not prose and was replaced.
    Substituted,
    LoopGuardExceeded,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStatus::Answered => "answered",
            TurnStatus::Substituted => "substituted",
            TurnStatus::LoopGuardExceeded => "loop_guard_exceeded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub content: String,
    pub status: TurnStatus,
    pub rounds: u32,
    pub tool_access: ToolAccess,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("model gateway failed: {0}")]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_rounds: u32,
    pub policy: TurnPolicy,
    pub leakage: LeakageGuard,
    pub fallback_message: String,
    pub guard_message: String,
}

impl OrchestratorConfig {
    pub fn from_policy(policy: &PolicyConfig, max_rounds: u32) -> Self {
        Self {
            max_rounds,
            policy: policy.turn_policy(),
            leakage: policy.leakage_guard(),
            fallback_message: policy.fallback_message.clone(),
            guard_message: policy.guard_message.clone(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_policy(&PolicyConfig::default(), DEFAULT_MAX_ROUNDS)
    }
}

pub struct Orchestrator {
    gateway: Arc<dyn ModelGateway>,
    registry: Arc<ToolRegistry>,
    config: Arc<OrchestratorConfig>,
    state: ConversationState,
    guard: LoopGuard,
    phase: Phase,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        registry: Arc<ToolRegistry>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        let guard = LoopGuard::new(config.max_rounds);
        Self {
            gateway,
            registry,
            config,
            state: ConversationState::new(),
            guard,
            phase: Phase::AwaitingInput,
        }
    }

    /// Seeds an empty conversation with a system message.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        if self.state.is_empty() {
            self.state = ConversationState::with_system_prompt(prompt);
        }
        self
    }

    pub fn with_state(mut self, state: ConversationState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub async fn run_turn(&mut self, input: &str) -> Result<TurnOutcome, TurnError> {
        self.run_turn_observed(input, None).await
    }

    /// Runs one user turn to completion, reporting tool activity to `events`.
    pub async fn run_turn_observed(
        &mut self,
        input: &str,
        events: Option<&EventSender>,
    ) -> Result<TurnOutcome, TurnError> {
        self.state.push(Message::user(input));

        let access = self.config.policy.classify(input);
        let manifest = match access {
            ToolAccess::Offered => self.registry.manifest(),
            ToolAccess::Suppressed => Vec::new(),
        };
        info!(?access, tools = manifest.len(), "starting turn");

        self.guard.reset();
        let result = self.turn_loop(&manifest, access, events).await;
        self.phase = Phase::AwaitingInput;

        match &result {
            Ok(outcome) => info!(status = outcome.status.as_str(), rounds = outcome.rounds, "turn finished"),
            Err(e) => warn!(error = %e, rounds = self.guard.rounds(), "turn aborted"),
        }
        result
    }

    async fn turn_loop(
        &mut self,
        manifest: &[Tool],
        access: ToolAccess,
        events: Option<&EventSender>,
    ) -> Result<TurnOutcome, TurnError> {
        loop {
            let round = match self.guard.advance() {
                Ok(round) => round,
                Err(exceeded) => {
                    warn!(bound = exceeded.bound, "loop guard tripped, abandoning turn");
                    let content = self.config.guard_message.clone();
                    self.state.append_unless_tail(Message::assistant(content.clone()));
                    return Ok(self.present(content, TurnStatus::LoopGuardExceeded, access, events));
                }
            };

            self.phase = Phase::Thinking;
            let mut turn = self.gateway.respond(self.state.messages(), manifest).await?;
            debug!(round, kind = ?turn.kind(), calls = turn.tool_calls.len(), "model responded");

            if access == ToolAccess::Suppressed && !turn.tool_calls.is_empty() {
                warn!(dropped = turn.tool_calls.len(), "discarding tool calls on a tool-suppressed turn");
                turn.tool_calls.clear();
            }

            if turn.kind() == TurnKind::Text {
                return Ok(self.finish(turn.content, access, events));
            }

            self.phase = Phase::Dispatching;
            let calls = turn.tool_calls.clone();
            self.state.push(turn.into_message());

            // Strictly in emitted order, one at a time.
            for call in &calls {
                self.dispatch(call, events).await;
            }
        }
    }

    async fn dispatch(&mut self, call: &ToolCall, events: Option<&EventSender>) {
        if self.state.has_result_for(&call.id) {
            warn!(id = %call.id, tool = %call.function.name, "skipping call with an already answered id");
            return;
        }

        let name = call.function.name.as_str();
        if let Some(events) = events {
            events.tool_call(&call.id, name, call.function.arguments.clone());
        }

        let result = match self.registry.invoke(name, &call.function.arguments).await {
            Ok(text) => {
                debug!(id = %call.id, tool = name, chars = text.len(), "tool succeeded");
                text
            }
            Err(err) => {
                match &err {
                    ToolError::NotFound { .. } => warn!(id = %call.id, tool = name, "model requested an unknown tool"),
                    _ => warn!(id = %call.id, tool = name, error = %err, "tool failed"),
                }
                err.result_text()
            }
        };

        if let Some(events) = events {
            events.tool_result(&call.id, name, &result);
        }
        self.state.push(Message::tool_result(&call.id, name, result));
    }

    fn finish(&mut self, content: Option<String>, access: ToolAccess, events: Option<&EventSender>) -> TurnOutcome {
        let leakage = &self.config.leakage;
        let (text, status) = match content {
            Some(text) if !leakage.is_leak(&text) => (text, TurnStatus::Answered),
            leaked => {
                warn!(text = ?leaked, "final model text is not prose, substituting");
                let substitute = self
                    .state
                    .last_assistant_text(|t| !leakage.is_leak(t))
                    .map(str::to_string)
                    .unwrap_or_else(|| self.config.fallback_message.clone());
                (substitute, TurnStatus::Substituted)
            }
        };

        self.state.append_unless_tail(Message::assistant(text.clone()));
        self.present(text, status, access, events)
    }

    fn present(
        &mut self,
        content: String,
        status: TurnStatus,
        access: ToolAccess,
        events: Option<&EventSender>,
    ) -> TurnOutcome {
        self.phase = Phase::Presenting;
        if let Some(events) = events {
            events.response_complete(&content, status.as_str());
        }

        TurnOutcome {
            content,
            status,
            rounds: self.guard.rounds(),
            tool_access: access,
        }
    }
}
