use anyhow::Result;
use flux_shared::ToolRegistry;
use flux_shared::toolbelts::{FileSmith, GitHub, SecretScanner, TestAdvisor};
use tracing::info;

use crate::config::EngineConfig;

/// Builds the registry of portfolio capabilities for the configured owner.
pub fn portfolio_registry(config: &EngineConfig, token: Option<String>) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    let github = GitHub::new(&config.github_api_url, &config.github_owner, token)?;
    registry.register_toolbelt(github)?;
    registry.register_toolbelt(project_files(config))?;
    registry.register_toolbelt(SecretScanner::default())?;
    registry.register_toolbelt(TestAdvisor)?;

    info!(tools = ?registry.names(), "tool registry ready");
    Ok(registry)
}

/// Project file access with the token file and the transcript database
/// (including its `-wal`/`-journal` siblings) refused.
fn project_files(config: &EngineConfig) -> FileSmith {
    let db_name = config
        .db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());

    FileSmith::new(config.project_root.clone())
        .with_denied([config.token_file.clone(), config.db_path.clone()])
        .with_denied_prefixes(db_name)
}

pub fn system_prompt(owner: &str) -> String {
    format!(
        "You are Flux, a portfolio assistant for the developer {owner}. \
         Answer questions about {owner}'s projects, code and recent work. \
         Use the available tools to look things up instead of guessing, and call a tool \
         only when the question needs it. After a tool returns, explain the result to the \
         user in plain sentences. Never reply with raw JSON, tool-call syntax or the \
         contents of result markers. For greetings and thanks, reply briefly and warmly."
    )
}
