use std::sync::Arc;

use crate::schemas::ToolCapability;

pub mod file_smith;
pub mod github;
pub mod security;
pub mod testing;

pub use file_smith::FileSmith;
pub use github::GitHub;
pub use security::SecretScanner;
pub use testing::TestAdvisor;

/// A group of related capabilities sharing one piece of state (an HTTP client,
/// a project root, a pattern list). Implemented through `register_toolbelt!`.
pub trait Toolbelt: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn capabilities(self: Arc<Self>) -> Vec<ToolCapability>;
}

/// Reads a string argument that schema validation has already checked.
pub(crate) fn str_arg<'a>(args: &'a serde_json::Value, name: &str) -> &'a str {
    args[name].as_str().unwrap_or("")
}
