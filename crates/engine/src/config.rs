use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::guard::DEFAULT_MAX_ROUNDS;
use crate::policy::PolicyConfig;
use crate::sessions::{DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_IDLE, SessionLimits};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/chat";
pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_GITHUB_OWNER: &str = "KlayTT";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_TOKEN_FILE: &str = "github_token.txt";
pub const DEFAULT_DB_PATH: &str = "flux.db";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub ollama_url: String,
    pub model: String,
    pub bind: String,
    pub github_owner: String,
    pub github_api_url: String,
    pub token_file: PathBuf,
    pub project_root: PathBuf,
    pub max_rounds: u32,
    pub db_path: PathBuf,
    pub policy_file: Option<PathBuf>,
    pub session_limits: SessionLimits,
}

impl EngineConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let project_root = match lookup("FLUX_PROJECT_ROOT").filter(|v| !v.trim().is_empty()) {
            Some(root) => PathBuf::from(root),
            None => env::current_dir().context("resolving current directory")?,
        };

        let max_rounds = number(&lookup, "FLUX_MAX_ROUNDS", DEFAULT_MAX_ROUNDS)?;
        let session_limits = SessionLimits {
            capacity: number(&lookup, "FLUX_SESSION_CAPACITY", DEFAULT_SESSION_CAPACITY)?,
            idle_ttl: Duration::from_secs(number(&lookup, "FLUX_SESSION_IDLE_SECS", DEFAULT_SESSION_IDLE.as_secs())?),
        };

        Ok(Self {
            ollama_url: var("OLLAMA_URL", DEFAULT_OLLAMA_URL),
            model: var("FLUX_MODEL", DEFAULT_MODEL),
            bind: var("FLUX_BIND", DEFAULT_BIND),
            github_owner: var("GITHUB_OWNER", DEFAULT_GITHUB_OWNER),
            github_api_url: var("GITHUB_API_URL", DEFAULT_GITHUB_API_URL),
            token_file: PathBuf::from(var("GITHUB_TOKEN_FILE", DEFAULT_TOKEN_FILE)),
            project_root,
            max_rounds,
            db_path: PathBuf::from(var("FLUX_DB_PATH", DEFAULT_DB_PATH)),
            policy_file: lookup("FLUX_POLICY_FILE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            session_limits,
        })
    }

    pub fn load_policy(&self) -> Result<PolicyConfig> {
        match &self.policy_file {
            Some(path) => {
                info!(path = %path.display(), "loading turn policy");
                PolicyConfig::load(path)
            }
            None => Ok(PolicyConfig::default()),
        }
    }

    pub fn github_token(&self) -> Option<String> {
        read_token(&self.token_file)
    }
}

fn number<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .ok()
            .with_context(|| format!("{} must be a positive integer, got '{}'", key, raw)),
        None => Ok(default),
    }
}

/// Token files are optional; without one the GitHub tools run unauthenticated.
pub fn read_token(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let token = raw.trim().to_string();
            (!token.is_empty()).then_some(token)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read GitHub token file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = EngineConfig::from_lookup(lookup(&[("FLUX_PROJECT_ROOT", "/srv/flux")])).unwrap();

        assert_eq!(config.ollama_url, DEFAULT_OLLAMA_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.github_owner, DEFAULT_GITHUB_OWNER);
        assert_eq!(config.github_api_url, DEFAULT_GITHUB_API_URL);
        assert_eq!(config.max_rounds, DEFAULT_MAX_ROUNDS);
        assert_eq!(config.project_root, PathBuf::from("/srv/flux"));
        assert!(config.policy_file.is_none());
        assert_eq!(config.session_limits, SessionLimits::default());
    }

    #[test]
    fn session_limits_are_configurable() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("FLUX_SESSION_CAPACITY", "32"),
            ("FLUX_SESSION_IDLE_SECS", "600"),
        ]))
        .unwrap();

        assert_eq!(config.session_limits.capacity, 32);
        assert_eq!(config.session_limits.idle_ttl, Duration::from_secs(600));
        assert!(EngineConfig::from_lookup(lookup(&[("FLUX_SESSION_CAPACITY", "-1")])).is_err());
    }

    #[test]
    fn overrides_and_blank_values() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("FLUX_MODEL", "qwen2.5"),
            ("FLUX_MAX_ROUNDS", " 5 "),
            ("GITHUB_OWNER", "  "),
            ("FLUX_POLICY_FILE", "policy.json"),
        ]))
        .unwrap();

        assert_eq!(config.model, "qwen2.5");
        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.github_owner, DEFAULT_GITHUB_OWNER);
        assert_eq!(config.policy_file, Some(PathBuf::from("policy.json")));
    }

    #[test]
    fn malformed_round_bound_is_an_error() {
        assert!(EngineConfig::from_lookup(lookup(&[("FLUX_MAX_ROUNDS", "many")])).is_err());
    }

    #[test]
    fn token_file_is_trimmed_and_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("github_token.txt");

        assert_eq!(read_token(&path), None);

        std::fs::write(&path, "  ghp_abc123\n").unwrap();
        assert_eq!(read_token(&path), Some("ghp_abc123".to_string()));

        std::fs::write(&path, "\n").unwrap();
        assert_eq!(read_token(&path), None);
    }
}
