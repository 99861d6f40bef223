use anyhow::Result;

use crate::register_toolbelt;
use crate::toolbelts::str_arg;

const CLEAN_REVIEW: &str =
    "Flux reviewed the code and it looks solid, but manual unit tests are always recommended!";

struct Heuristic {
    triggers: &'static [&'static str],
    satisfied_by: &'static [&'static str],
    suggestion: &'static str,
}

const HEURISTICS: &[Heuristic] = &[
    Heuristic {
        triggers: &["class", "void", "Task"],
        satisfied_by: &["== null", "is null"],
        suggestion: "Missing Null Checks: Ensure you test how this code handles null inputs.",
    },
    Heuristic {
        triggers: &["for", "foreach", ".Select"],
        satisfied_by: &[],
        suggestion: "Collection Edge Cases: Test with an empty list and a list with only one item.",
    },
    Heuristic {
        triggers: &["string"],
        satisfied_by: &[],
        suggestion: "String Inputs: Test with String.Empty and very long strings.",
    },
];

/// Keyword heuristics that suggest unit tests for a code snippet.
#[derive(Default)]
pub struct TestAdvisor;

impl TestAdvisor {
    pub fn review(&self, snippet: &str) -> String {
        let suggestions: Vec<String> = HEURISTICS
            .iter()
            .filter(|h| h.triggers.iter().any(|t| snippet.contains(t)))
            .filter(|h| !h.satisfied_by.iter().any(|s| snippet.contains(s)))
            .map(|h| format!("- {}", h.suggestion))
            .collect();

        if suggestions.is_empty() {
            return CLEAN_REVIEW.to_string();
        }

        format!("### Unit Test Recommendations:\n{}", suggestions.join("\n"))
    }
}

register_toolbelt! {
    TestAdvisor {
        description: "Suggests unit tests for a piece of code",
        tools: {
            "review-code-for-tests" => review_code_for_tests {
                description: "Analyzes a code snippet and suggests unit test cases worth writing (null handling, collection edge cases, string inputs).",
                params: ["codeSnippet": "string" => "The code to analyze"]
            }
        }
    }
}

impl TestAdvisor {
    async fn review_code_for_tests(&self, args: &serde_json::Value) -> Result<String> {
        Ok(self.review(str_arg(args, "codeSnippet")))
    }
}
