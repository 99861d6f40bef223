use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, warn};

use crate::register_toolbelt;
use crate::toolbelts::str_arg;

pub const DEFAULT_MAX_CHARS: usize = 8000;

/// File names starting with these are never read, wherever they sit in the tree.
pub const DEFAULT_DENIED_PREFIXES: &[&str] = &[".env"];

/// Read-only access to files under a single project directory.
///
/// Credentials and state files (`.env*`, the GitHub token file, the transcript
/// database) can live under the root, so reads are checked against a deny-list
/// of exact paths and file-name prefixes.
pub struct FileSmith {
    root: PathBuf,
    max_chars: usize,
    denied_paths: Vec<PathBuf>,
    denied_prefixes: Vec<String>,
}

impl Default for FileSmith {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl FileSmith {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_chars: DEFAULT_MAX_CHARS,
            denied_paths: Vec::new(),
            denied_prefixes: DEFAULT_DENIED_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Refuses these files. Relative paths resolve against the working
    /// directory, like the config paths they usually come from.
    pub fn with_denied<P: Into<PathBuf>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.denied_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Refuses any file whose name starts with one of `prefixes`.
    pub fn with_denied_prefixes<S: Into<String>>(mut self, prefixes: impl IntoIterator<Item = S>) -> Self {
        self.denied_prefixes.extend(prefixes.into_iter().map(Into::into));
        self
    }

    async fn is_denied(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if self.denied_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            return true;
        }

        for denied in &self.denied_paths {
            // Denied files that do not exist yet cannot match a canonical path.
            if let Ok(denied) = tokio::fs::canonicalize(denied).await {
                if denied == path {
                    return true;
                }
            }
        }
        false
    }
}

register_toolbelt! {
    FileSmith {
        description: "Reads files from the local project directory",
        tools: {
            "read-project-file" => read_project_file {
                description: "Reads a file from the local project directory and returns its content. Large files are truncated.",
                params: ["fileName": "string" => "Path of the file relative to the project root"]
            }
        }
    }
}

impl FileSmith {
    async fn read_project_file(&self, args: &serde_json::Value) -> Result<String> {
        let file_name = str_arg(args, "fileName").trim();
        if file_name.is_empty() {
            return Ok("Error: fileName cannot be empty".to_string());
        }

        let root = tokio::fs::canonicalize(&self.root).await?;
        let path = match tokio::fs::canonicalize(root.join(file_name)).await {
            Ok(path) => path,
            Err(_) => {
                return Ok(format!("Error: File '{}' not found in the project.", file_name));
            }
        };

        if !path.starts_with(&root) {
            return Ok(format!("Error: '{}' is outside the project directory.", file_name));
        }
        if path.is_dir() {
            return Ok(format!("Error: '{}' is a directory, not a file.", file_name));
        }
        if self.is_denied(&path).await {
            warn!(file = file_name, "refused read of a denied project file");
            return Ok(format!("Error: '{}' is not readable.", file_name));
        }

        let content = tokio::fs::read_to_string(&path).await?;
        debug!(file = file_name, chars = content.len(), "read project file");

        Ok(truncate(content, self.max_chars))
    }
}

fn truncate(content: String, max_chars: usize) -> String {
    let total = content.chars().count();
    if total <= max_chars {
        return content;
    }

    let kept: String = content.chars().take(max_chars).collect();
    format!(
        "{}\n\n[WARNING] File truncated: showing the first {} of {} characters.",
        kept, max_chars, total
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolbelts::Toolbelt;
    use serde_json::json;
    use std::sync::Arc;

    async fn read(smith: FileSmith, file_name: &str) -> String {
        let capability = Arc::new(smith).capabilities().remove(0);
        capability.invoke(json!({ "fileName": file_name })).await.unwrap()
    }

    #[tokio::test]
    async fn reads_file_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"flux\"").unwrap();

        let out = read(FileSmith::new(dir.path()), "Cargo.toml").await;

        assert_eq!(out, "[package]\nname = \"flux\"");
    }

    #[tokio::test]
    async fn missing_file_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();

        let out = read(FileSmith::new(dir.path()), "nope.md").await;

        assert_eq!(out, "Error: File 'nope.md' not found in the project.");
    }

    #[tokio::test]
    async fn refuses_paths_outside_root() {
        let outer = tempfile::tempdir().unwrap();
        let project = outer.path().join("project");
        std::fs::create_dir(&project).unwrap();
        std::fs::write(outer.path().join("secret.txt"), "hidden").unwrap();

        let out = read(FileSmith::new(&project), "../secret.txt").await;

        assert_eq!(out, "Error: '../secret.txt' is outside the project directory.");
    }

    #[tokio::test]
    async fn denied_token_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let token = dir.path().join("github_token.txt");
        std::fs::write(&token, "ghp_SECRET123").unwrap();

        let smith = FileSmith::new(dir.path()).with_denied([&token]);
        let out = read(smith, "github_token.txt").await;

        assert_eq!(out, "Error: 'github_token.txt' is not readable.");
        assert!(!out.contains("ghp_SECRET123"));
    }

    #[tokio::test]
    async fn denied_paths_match_through_other_spellings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data").join("flux.db"), "SQLite format 3").unwrap();

        let smith = FileSmith::new(dir.path()).with_denied([dir.path().join("data/flux.db")]);
        let out = read(smith, "data/../data/./flux.db").await;

        assert_eq!(out, "Error: 'data/../data/./flux.db' is not readable.");
    }

    #[tokio::test]
    async fn env_files_are_refused_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join(".env"), "GITHUB_TOKEN=ghp_SECRET123").unwrap();
        std::fs::write(dir.path().join("config").join(".env.local"), "GITHUB_TOKEN=ghp_SECRET123").unwrap();
        std::fs::write(dir.path().join("README.md"), "# Flux").unwrap();

        assert_eq!(read(FileSmith::new(dir.path()), ".env").await, "Error: '.env' is not readable.");
        assert_eq!(
            read(FileSmith::new(dir.path()), "config/.env.local").await,
            "Error: 'config/.env.local' is not readable."
        );
        assert_eq!(read(FileSmith::new(dir.path()), "README.md").await, "# Flux");
    }

    #[tokio::test]
    async fn extra_prefixes_extend_the_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("flux.db-wal"), "wal").unwrap();
        std::fs::write(dir.path().join(".env"), "X=1").unwrap();

        let smith = || FileSmith::new(dir.path()).with_denied_prefixes(["flux.db"]);

        assert_eq!(read(smith(), "flux.db-wal").await, "Error: 'flux.db-wal' is not readable.");
        assert_eq!(read(smith(), ".env").await, "Error: '.env' is not readable.");
    }

    #[tokio::test]
    async fn large_files_are_truncated_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(50)).unwrap();

        let out = read(FileSmith::new(dir.path()).with_max_chars(10), "big.txt").await;

        assert!(out.starts_with(&"x".repeat(10)));
        assert!(out.ends_with("[WARNING] File truncated: showing the first 10 of 50 characters."));
    }
}
