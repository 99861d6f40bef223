use anyhow::Result;

use crate::register_toolbelt;
use crate::toolbelts::str_arg;

const DEFAULT_RISK_PATTERNS: &[&str] = &["api_key", "password", "secret", "token", "password="];

/// Case-insensitive substring scan for strings that usually indicate a
/// committed credential.
pub struct SecretScanner {
    patterns: Vec<String>,
}

impl Default for SecretScanner {
    fn default() -> Self {
        Self::with_patterns(DEFAULT_RISK_PATTERNS.iter().map(|p| p.to_string()))
    }
}

impl SecretScanner {
    pub fn with_patterns(patterns: impl IntoIterator<Item = String>) -> Self {
        Self {
            patterns: patterns.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    pub fn scan(&self, file_name: &str, content: &str) -> String {
        let haystack = content.to_lowercase();
        let found: Vec<&str> = self
            .patterns
            .iter()
            .filter(|p| haystack.contains(p.as_str()))
            .map(String::as_str)
            .collect();

        if found.is_empty() {
            return format!("[CLEAN] No obvious secrets found in {}.", file_name);
        }

        format!(
            "[SECURITY ALERT] Found potential risks in {}: {}. Please review before pushing!",
            file_name,
            found.join(", ")
        )
    }
}

register_toolbelt! {
    SecretScanner {
        description: "Scans file content for strings that look like leaked credentials",
        tools: {
            "scan-for-secrets" => scan_for_secrets {
                description: "Checks the given file content for risky strings such as API keys, passwords and tokens before it is pushed.",
                params: [
                    "fileName": "string" => "Name of the file being scanned",
                    "content": "string" => "Full text content of the file"
                ]
            }
        }
    }
}

impl SecretScanner {
    async fn scan_for_secrets(&self, args: &serde_json::Value) -> Result<String> {
        Ok(self.scan(str_arg(args, "fileName"), str_arg(args, "content")))
    }
}
