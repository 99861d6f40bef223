use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use flux_shared::Tool;

use super::{AssistantTurn, GatewayError, ModelGateway};
use crate::message::Message;

/// What the gateway was shown on one call.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCall {
    pub history_len: usize,
    pub tool_names: Vec<String>,
}

/// Replays a fixed list of responses, for offline runs and tests.
///
/// Once the script is exhausted it repeats `fallback` if one was given,
/// otherwise it fails with [`GatewayError::Malformed`].
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<AssistantTurn, GatewayError>>>,
    fallback: Option<AssistantTurn>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl ScriptedGateway {
    pub fn new(turns: impl IntoIterator<Item = AssistantTurn>) -> Self {
        Self::with_results(turns.into_iter().map(Ok))
    }

    pub fn with_results(results: impl IntoIterator<Item = Result<AssistantTurn, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    /// A gateway that answers every call with `turn`.
    pub fn repeating(turn: AssistantTurn) -> Self {
        Self {
            fallback: Some(turn),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn respond(&self, history: &[Message], tools: &[Tool]) -> Result<AssistantTurn, GatewayError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(GatewayCall {
                history_len: history.len(),
                tool_names: tools.iter().map(|t| t.function.name.clone()).collect(),
            });

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match (next, &self.fallback) {
            (Some(result), _) => result,
            (None, Some(turn)) => Ok(turn.clone()),
            (None, None) => Err(GatewayError::Malformed("script exhausted".to_string())),
        }
    }
}
