use std::time::Duration;

use anyhow::Result;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::{info, warn};

use crate::register_toolbelt;
use crate::toolbelts::str_arg;

const DEFAULT_COMMIT_COUNT: i64 = 5;

#[derive(Deserialize, Debug, Clone)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub private: bool,
    pub owner: RepositoryOwner,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RepositoryOwner {
    pub login: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CommitEntry {
    pub commit: CommitDetail,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CommitDetail {
    pub message: String,
    #[serde(default)]
    pub author: Option<CommitAuthor>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CommitAuthor {
    #[serde(default)]
    pub date: Option<String>,
}

/// Read-only queries against one GitHub account's repositories.
pub struct GitHub {
    client: reqwest::Client,
    api_base: String,
    owner: String,
    token: Option<String>,
}

impl GitHub {
    pub fn new(api_base: impl Into<String>, owner: impl Into<String>, token: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));

        let client = reqwest::Client::builder()
            .user_agent("Flux-Portfolio-Agent")
            .default_headers(headers)
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{}", self.api_base, path));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn repo_path(&self, repo_name: &str) -> String {
        format!(
            "/repos/{}/{}",
            urlencoding::encode(&self.owner),
            urlencoding::encode(repo_name)
        )
    }

    async fn fetch_repositories(&self) -> Result<Vec<Repository>> {
        // Without a token only the public listing of the owner is reachable.
        let request = match self.token {
            Some(_) => self
                .get("/user/repos")
                .query(&[("per_page", "100"), ("affiliation", "owner")]),
            None => self
                .get(&format!("/users/{}/repos", urlencoding::encode(&self.owner)))
                .query(&[("per_page", "100")]),
        };

        Ok(request.send().await?.error_for_status()?.json().await?)
    }

    async fn fetch_readme(&self, repo_name: &str) -> Result<String> {
        Ok(self
            .get(&format!("{}/readme", self.repo_path(repo_name)))
            .header(ACCEPT, "application/vnd.github.raw+json")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?)
    }

    async fn fetch_commits(&self, repo_name: &str, count: i64) -> Result<Vec<CommitEntry>> {
        let per_page = count.to_string();
        Ok(self
            .get(&format!("{}/commits", self.repo_path(repo_name)))
            .query(&[("author", self.owner.as_str()), ("per_page", per_page.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

register_toolbelt! {
    GitHub {
        description: "Looks up the portfolio owner's public GitHub repositories",
        tools: {
            "list-repositories" => list_repositories {
                description: "Lists the owner's public GitHub repositories with their descriptions. Use this first to learn exact repository names.",
                params: []
            },
            "get-readme" => get_readme {
                description: "Fetches the README of one of the owner's repositories.",
                params: ["repoName": "string" => "Exact repository name as returned by list-repositories"]
            },
            "get-recent-commits" => get_recent_commits {
                description: "Lists the most recent commits the owner made to a repository, newest first.",
                params: [
                    "repoName": "string" => "Exact repository name as returned by list-repositories",
                    "count": "integer" => "How many commits to return (default 5)" (optional)
                ]
            },
        }
    }
}

impl GitHub {
    async fn list_repositories(&self, _args: &serde_json::Value) -> Result<String> {
        match self.fetch_repositories().await {
            Ok(repos) => Ok(format_repositories(&self.owner, &repos)),
            Err(e) => {
                warn!(error = %e, "listing repositories failed");
                Ok(format!("GitHub Error: {}", e))
            }
        }
    }

    async fn get_readme(&self, args: &serde_json::Value) -> Result<String> {
        let repo_name = str_arg(args, "repoName").trim();
        if repo_name.is_empty() {
            return Ok("ERROR: repoName cannot be empty".to_string());
        }

        match self.fetch_readme(repo_name).await {
            Ok(content) => {
                info!(repo = repo_name, chars = content.len(), "retrieved README");
                Ok(format_readme(repo_name, &content))
            }
            Err(e) => {
                warn!(repo = repo_name, error = %e, "README lookup failed");
                Ok(format!("ERROR: {}", e))
            }
        }
    }

    async fn get_recent_commits(&self, args: &serde_json::Value) -> Result<String> {
        let repo_name = str_arg(args, "repoName").trim();
        if repo_name.is_empty() {
            return Ok("Error: repoName cannot be empty".to_string());
        }

        let count = args["count"].as_i64().unwrap_or(DEFAULT_COMMIT_COUNT).clamp(1, 100);

        match self.fetch_commits(repo_name, count).await {
            Ok(commits) => {
                let commits: Vec<CommitEntry> = commits.into_iter().take(count as usize).collect();
                Ok(format_commits(repo_name, &commits))
            }
            Err(e) => {
                warn!(repo = repo_name, error = %e, "commit lookup failed");
                Ok(format!("Error: {}", e))
            }
        }
    }
}

pub fn format_repositories(owner: &str, repos: &[Repository]) -> String {
    let lines: Vec<String> = repos
        .iter()
        .filter(|r| r.owner.login.eq_ignore_ascii_case(owner) && !r.private)
        .map(|r| {
            format!(
                "{}: {}",
                r.name,
                r.description.as_deref().unwrap_or("No description")
            )
        })
        .collect();

    if lines.is_empty() {
        return format!("No public repositories found for {}.", owner);
    }

    format!("{}'s GitHub Repos:\n{}", owner, lines.join("\n"))
}

pub fn format_readme(repo_name: &str, content: &str) -> String {
    format!(
        "[DATABASE_RESULT_START]\n\
         REPOSITORY: {}\n\
         FILE: README.md\n\
         CONTENT: {}\n\
         [DATABASE_RESULT_END]\n\
         INSTRUCTION: Use the content above to answer the user's request.",
        repo_name, content
    )
}

pub fn format_commits(repo_name: &str, commits: &[CommitEntry]) -> String {
    if commits.is_empty() {
        return format!("No recent commits found for {}.", repo_name);
    }

    let lines: Vec<String> = commits
        .iter()
        .map(|c| {
            let date = c
                .commit
                .author
                .as_ref()
                .and_then(|a| a.date.as_deref())
                .map(|d| d.get(..10).unwrap_or(d))
                .unwrap_or("unknown date");
            let message = c.commit.message.lines().next().unwrap_or("");
            format!("[{}] {}", date, message)
        })
        .collect();

    format!("Recent activity for {}:\n{}", repo_name, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repos() -> Vec<Repository> {
        serde_json::from_value(json!([
            { "name": "PortfolioAgentFlux", "description": "Agent demo", "private": false, "owner": { "login": "klaytt" } },
            { "name": "Dotfiles", "description": null, "private": false, "owner": { "login": "KlayTT" } },
            { "name": "Secret", "description": "hidden", "private": true, "owner": { "login": "KlayTT" } },
            { "name": "Fork", "description": "someone else", "private": false, "owner": { "login": "other" } }
        ]))
        .unwrap()
    }

    #[test]
    fn repositories_are_filtered_to_public_owned() {
        assert_eq!(
            format_repositories("KlayTT", &repos()),
            "KlayTT's GitHub Repos:\nPortfolioAgentFlux: Agent demo\nDotfiles: No description"
        );
    }

    #[test]
    fn empty_listing_uses_sentinel() {
        assert_eq!(
            format_repositories("KlayTT", &[]),
            "No public repositories found for KlayTT."
        );
    }

    #[test]
    fn readme_is_wrapped_in_markers() {
        let block = format_readme("Flux", "# Flux");

        assert!(block.starts_with("[DATABASE_RESULT_START]\nREPOSITORY: Flux\nFILE: README.md\nCONTENT: # Flux"));
        assert!(block.contains("[DATABASE_RESULT_END]"));
        assert!(block.ends_with("INSTRUCTION: Use the content above to answer the user's request."));
    }

    #[test]
    fn commits_show_date_and_subject_line() {
        let commits: Vec<CommitEntry> = serde_json::from_value(json!([
            { "commit": { "message": "Add tool loop\n\nLonger body", "author": { "date": "2025-03-14T09:26:53Z" } } },
            { "commit": { "message": "Initial commit", "author": null } }
        ]))
        .unwrap();

        assert_eq!(
            format_commits("Flux", &commits),
            "Recent activity for Flux:\n[2025-03-14] Add tool loop\n[unknown date] Initial commit"
        );
        assert_eq!(format_commits("Flux", &[]), "No recent commits found for Flux.");
    }

    #[test]
    fn empty_token_is_treated_as_anonymous() {
        let github = GitHub::new("https://example.test/", "KlayTT", Some("  ".to_string())).unwrap();

        assert!(github.token.is_none());
        assert_eq!(github.api_base, "https://example.test");
        assert_eq!(github.repo_path("My Repo"), "/repos/KlayTT/My%20Repo");
    }
}
