use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::schemas::{Tool, ToolCapability};
use crate::toolbelts::Toolbelt;

/// Prefix of the tool-result text written when the model names a tool that
/// does not exist.
pub const UNKNOWN_TOOL_MARKER: &str = "[UNKNOWN TOOL]";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("capability '{0}' is already registered")]
    DuplicateCapability(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool '{name}' not found")]
    NotFound { name: String, available: Vec<String> },
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("tool '{tool}' failed: {message}")]
    Invocation { tool: String, message: String },
}

impl ToolError {
    /// Text fed back to the model in place of a tool result.
    pub fn result_text(&self) -> String {
        match self {
            ToolError::NotFound { name, available } => format!(
                "{} '{}' is not an available tool. Available tools: {}.",
                UNKNOWN_TOOL_MARKER,
                name,
                if available.is_empty() { "none".to_string() } else { available.join(", ") }
            ),
            other => format!("Error: {}", other),
        }
    }
}

/// Capabilities keyed by name, in registration order.
///
/// Built once at start-up and shared read-only afterwards (`Arc<ToolRegistry>`),
/// so there is no removal and no interior mutability.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    capabilities: Vec<Arc<ToolCapability>>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: ToolCapability) -> Result<(), RegistryError> {
        let name = capability.name();
        if self.index.contains_key(name) {
            return Err(RegistryError::DuplicateCapability(name.to_string()));
        }

        debug!(tool = name, "registered capability");
        self.index.insert(name, self.capabilities.len());
        self.capabilities.push(Arc::new(capability));
        Ok(())
    }

    /// Registers every capability of a toolbelt. Nothing is registered if any
    /// name collides.
    pub fn register_toolbelt<T: Toolbelt>(&mut self, toolbelt: T) -> Result<usize, RegistryError> {
        let (belt, summary) = (toolbelt.name(), toolbelt.description());
        let capabilities = Arc::new(toolbelt).capabilities();

        for (i, capability) in capabilities.iter().enumerate() {
            let name = capability.name();
            let repeated = capabilities[..i].iter().any(|c| c.name() == name);
            if repeated || self.index.contains_key(name) {
                return Err(RegistryError::DuplicateCapability(name.to_string()));
            }
        }

        let count = capabilities.len();
        for capability in capabilities {
            self.register(capability)?;
        }
        debug!(toolbelt = belt, description = summary, tools = count, "registered toolbelt");
        Ok(count)
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<ToolCapability>> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.capabilities[i]))
    }

    pub fn manifest(&self) -> Vec<Tool> {
        self.capabilities.iter().map(|c| c.schema().to_tool()).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Resolves, validates and runs a tool.
    pub async fn invoke(&self, name: &str, args: &Value) -> Result<String, ToolError> {
        let capability = self.resolve(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
            available: self.names().iter().map(|n| n.to_string()).collect(),
        })?;

        let args = capability.schema().validate(args)?;

        capability
            .invoke(args)
            .await
            .map_err(|e| ToolError::Invocation {
                tool: name.to_string(),
                message: format!("{:#}", e),
            })
    }
}
