//! GitHub REST client.
//!
//! [`GitHubApi`] covers the handful of calls the service needs: resolving
//! the caller behind a token, listing repositories, registering push
//! webhooks, reading the changed files of a comparison or commit, and
//! fetching file contents. [`GitHubClient`] implements it with `reqwest`.
//!
//! Calls are not retried. Any non-2xx response becomes an error carrying
//! the status and the request URL. URLs handed in by callers (compare,
//! commit and contents URLs) must live under the configured `api_url`;
//! anything else is refused before the token is sent.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GitHubConfig;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Removed,
    Modified,
    Renamed,
    Copied,
    Changed,
    Unchanged,
    #[serde(other)]
    Unknown,
}

/// One entry of the `files` array in a compare or commit response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    pub status: FileStatus,
    #[serde(default)]
    pub changes: u64,
    #[serde(default)]
    pub contents_url: String,
    #[serde(default)]
    pub previous_filename: Option<String>,
}

#[derive(Deserialize)]
struct FilesEnvelope {
    #[serde(default)]
    files: Vec<ChangedFile>,
}

#[derive(Deserialize)]
struct CommitSummary {
    url: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// `GET /user`
    async fn user(&self, token: &str) -> Result<GitHubUser>;

    /// `GET /users/{login}/repos`
    async fn list_repos(&self, token: &str, login: &str) -> Result<Vec<Repo>>;

    /// `POST /repos/{repo}/hooks` subscribing `callback_url` to push events.
    /// Returns the HTTP status; 201 means the hook was created.
    async fn create_webhook(&self, token: &str, repo_full_name: &str, callback_url: &str)
        -> Result<u16>;

    /// Files changed in a commit comparison.
    async fn compare(&self, token: &str, compare_url: &str) -> Result<Vec<ChangedFile>>;

    /// API URL of the most recent commit on the default branch.
    async fn latest_commit_url(&self, token: &str, repo_full_name: &str) -> Result<Option<String>>;

    /// Files changed by a single commit.
    async fn commit_files(&self, token: &str, commit_url: &str) -> Result<Vec<ChangedFile>>;

    /// Decoded text of a file from its contents URL.
    async fn blob_text(&self, token: &str, contents_url: &str) -> Result<String>;
}

pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    webhook_secret: Option<String>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            webhook_secret: config.resolved_webhook_secret(),
        })
    }

    /// Whether `url` points at the configured API host.
    pub fn is_api_url(&self, url: &str) -> bool {
        url.strip_prefix(self.api_url.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
    }

    async fn get_json<T: DeserializeOwned>(&self, token: &str, url: &str) -> Result<T> {
        if !self.is_api_url(url) {
            bail!("Refusing to send GitHub credentials to {}", url);
        }
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header(ACCEPT, GITHUB_ACCEPT)
            .send()
            .await
            .with_context(|| format!("GitHub request failed: GET {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("GitHub API error {} for GET {}: {}", status, url, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Invalid GitHub response from GET {}", url))
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn user(&self, token: &str) -> Result<GitHubUser> {
        self.get_json(token, &format!("{}/user", self.api_url))
            .await
    }

    async fn list_repos(&self, token: &str, login: &str) -> Result<Vec<Repo>> {
        self.get_json(token, &format!("{}/users/{}/repos", self.api_url, login))
            .await
    }

    async fn create_webhook(
        &self,
        token: &str,
        repo_full_name: &str,
        callback_url: &str,
    ) -> Result<u16> {
        let url = format!("{}/repos/{}/hooks", self.api_url, repo_full_name);
        let mut hook_config = serde_json::json!({
            "url": callback_url,
            "content_type": "json",
        });
        if let Some(secret) = &self.webhook_secret {
            hook_config["secret"] = serde_json::json!(secret);
        }
        let body = serde_json::json!({
            "name": "web",
            "active": true,
            "events": ["push"],
            "config": hook_config,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(ACCEPT, GITHUB_ACCEPT)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("GitHub request failed: POST {}", url))?;

        Ok(response.status().as_u16())
    }

    async fn compare(&self, token: &str, compare_url: &str) -> Result<Vec<ChangedFile>> {
        let envelope: FilesEnvelope = self.get_json(token, compare_url).await?;
        Ok(envelope.files)
    }

    async fn latest_commit_url(&self, token: &str, repo_full_name: &str) -> Result<Option<String>> {
        let url = format!("{}/repos/{}/commits?per_page=1", self.api_url, repo_full_name);
        let commits: Vec<CommitSummary> = self.get_json(token, &url).await?;
        Ok(commits.into_iter().next().map(|c| c.url))
    }

    async fn commit_files(&self, token: &str, commit_url: &str) -> Result<Vec<ChangedFile>> {
        let envelope: FilesEnvelope = self.get_json(token, commit_url).await?;
        Ok(envelope.files)
    }

    async fn blob_text(&self, token: &str, contents_url: &str) -> Result<String> {
        let contents: ContentsResponse = self.get_json(token, contents_url).await?;
        decode_content(&contents.content, contents.encoding.as_deref())
            .with_context(|| format!("Failed to decode contents of {}", contents_url))
    }
}

/// Decode the `content` field of a contents response. GitHub wraps base64
/// payloads at 60 columns, so whitespace is stripped first.
pub fn decode_content(content: &str, encoding: Option<&str>) -> Result<String> {
    match encoding {
        Some("base64") | None => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;
            Ok(String::from_utf8(bytes).context("file is not valid UTF-8")?)
        }
        Some("utf-8") | Some("utf8") => Ok(content.to_string()),
        Some(other) => bail!("Unsupported content encoding: {}", other),
    }
}
