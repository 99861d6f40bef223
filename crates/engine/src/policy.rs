//! Data-driven turn policies: which inputs get no tools, and which model
//! outputs must never be shown to the user as prose.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_TRIGGER_PHRASES: &[&str] = &[
    "hi", "hello", "hey", "howdy", "greetings", "good morning", "good afternoon",
    "good evening", "thanks", "thank you", "thx", "cheers", "bye", "goodbye",
    "good night", "see you", "see ya", "farewell",
];

const DEFAULT_PLACEHOLDERS: &[&str] = &["{}", "[]", "null", "\"\"", "undefined"];

const DEFAULT_RESULT_MARKERS: &[&str] = &[
    "[DATABASE_RESULT_START]",
    "[DATABASE_RESULT_END]",
    "<|python_tag|>",
];

const DEFAULT_FALLBACK_MESSAGE: &str =
    "I'm not sure how to answer that yet. Could you rephrase, or ask about a specific project?";

const DEFAULT_GUARD_MESSAGE: &str =
    "I couldn't finish that request. Please try again, perhaps with a more specific question.";

/// Policy file contents (`FLUX_POLICY_FILE`). Missing fields keep defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    pub trigger_phrases: Vec<String>,
    pub placeholders: Vec<String>,
    pub result_markers: Vec<String>,
    pub fallback_message: String,
    pub guard_message: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            trigger_phrases: owned(DEFAULT_TRIGGER_PHRASES),
            placeholders: owned(DEFAULT_PLACEHOLDERS),
            result_markers: owned(DEFAULT_RESULT_MARKERS),
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            guard_message: DEFAULT_GUARD_MESSAGE.to_string(),
        }
    }
}

impl PolicyConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading policy file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing policy file {}", path.display()))
    }

    pub fn turn_policy(&self) -> TurnPolicy {
        TurnPolicy::new(&self.trigger_phrases)
    }

    pub fn leakage_guard(&self) -> LeakageGuard {
        LeakageGuard::new(&self.placeholders, &self.result_markers)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolAccess {
    Offered,
    /// Social exchange: the model gets an empty manifest for the whole turn.
    Suppressed,
}

/// Classifies user input by whole-word trigger phrases.
#[derive(Debug, Clone)]
pub struct TurnPolicy {
    triggers: Vec<Vec<String>>,
}

impl TurnPolicy {
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Self {
        Self {
            triggers: phrases
                .iter()
                .map(|p| words(p.as_ref()))
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, input: &str) -> ToolAccess {
        let input = words(input);
        let triggered = self
            .triggers
            .iter()
            .any(|phrase| input.windows(phrase.len()).any(|window| window == phrase.as_slice()));

        if triggered {
            ToolAccess::Suppressed
        } else {
            ToolAccess::Offered
        }
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Decides whether terminal assistant text is prose or leaked structure.
#[derive(Debug, Clone)]
pub struct LeakageGuard {
    placeholders: Vec<String>,
    markers: Vec<String>,
}

impl LeakageGuard {
    pub fn new<S: AsRef<str>>(placeholders: &[S], markers: &[S]) -> Self {
        Self {
            placeholders: placeholders.iter().map(|p| compact(p.as_ref())).collect(),
            markers: markers.iter().map(|m| m.as_ref().to_string()).collect(),
        }
    }

    /// True for blank text, placeholders, raw JSON payloads (bare or fenced)
    /// and text carrying a tool-result marker.
    pub fn is_leak(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return true;
        }

        let compacted = compact(trimmed);
        if self.placeholders.iter().any(|p| p.eq_ignore_ascii_case(&compacted)) {
            return true;
        }

        if self.markers.iter().any(|m| trimmed.contains(m.as_str())) {
            return true;
        }

        is_json_payload(strip_code_fence(trimmed))
    }
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().trim_end_matches("```").trim()
}

fn is_json_payload(text: &str) -> bool {
    let structured = (text.starts_with('{') && text.ends_with('}'))
        || (text.starts_with('[') && text.ends_with(']'));

    structured && serde_json::from_str::<serde_json::Value>(text).is_ok()
}
