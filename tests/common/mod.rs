//! Fakes shared by the integration tests.
//!
//! Each fake implements one collaborator trait and records how it was
//! called, so tests can assert on the exact traffic the pipeline produced.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use codelink::analysis::{Analyzer, DocRequest};
use codelink::config::Config;
use codelink::db;
use codelink::embedding::Embedder;
use codelink::github::{ChangedFile, FileStatus, GitHubApi, GitHubUser, Repo};
use codelink::llm::{ChatMessage, ChatModel};
use codelink::migrate;
use codelink::models::{EmbeddedChunk, RetrievedChunk};
use codelink::services::Services;
use codelink::store::memory::InMemoryVectorStore;
use codelink::store::VectorStore;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ─── GitHub ─────────────────────────────────────────────────────────

/// Scripted GitHub: a fixed change list, blob texts keyed by contents
/// URL, and a token → login table.
#[derive(Default)]
pub struct FakeGitHub {
    pub users: HashMap<String, String>,
    pub files: Vec<ChangedFile>,
    pub blobs: HashMap<String, String>,
    pub failing_blobs: HashSet<String>,
    pub latest_commit: Option<String>,
    pub webhook_status: u16,
    pub compare_calls: Mutex<Vec<String>>,
    pub commit_calls: Mutex<Vec<String>>,
    pub webhook_calls: Mutex<Vec<(String, String)>>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self {
            webhook_status: 201,
            ..Self::default()
        }
    }

    pub fn with_user(mut self, token: &str, login: &str) -> Self {
        self.users.insert(token.to_string(), login.to_string());
        self
    }

    /// Add a changed file whose contents are served at `blob:<filename>`.
    pub fn with_file(mut self, filename: &str, status: FileStatus, changes: u64, text: &str) -> Self {
        let url = format!("blob:{}", filename);
        self.blobs.insert(url.clone(), text.to_string());
        self.files.push(ChangedFile {
            filename: filename.to_string(),
            status,
            changes,
            contents_url: url,
            previous_filename: None,
        });
        self
    }

    pub fn with_rename(mut self, from: &str, to: &str, changes: u64, text: &str) -> Self {
        let url = format!("blob:{}", to);
        self.blobs.insert(url.clone(), text.to_string());
        self.files.push(ChangedFile {
            filename: to.to_string(),
            status: FileStatus::Renamed,
            changes,
            contents_url: url,
            previous_filename: Some(from.to_string()),
        });
        self
    }

    pub fn failing(mut self, filename: &str) -> Self {
        self.failing_blobs.insert(format!("blob:{}", filename));
        self
    }

    pub fn compare_count(&self) -> usize {
        self.compare_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn user(&self, token: &str) -> Result<GitHubUser> {
        match self.users.get(token) {
            Some(login) => Ok(GitHubUser {
                login: login.clone(),
            }),
            None => bail!("GitHub API returned 401 Unauthorized"),
        }
    }

    async fn list_repos(&self, _token: &str, login: &str) -> Result<Vec<Repo>> {
        Ok(vec![Repo {
            id: 1,
            name: "widgets".to_string(),
            full_name: format!("{}/widgets", login),
            private: false,
            html_url: format!("https://github.com/{}/widgets", login),
            description: None,
            default_branch: Some("main".to_string()),
        }])
    }

    async fn create_webhook(&self, _token: &str, repo: &str, callback_url: &str) -> Result<u16> {
        self.webhook_calls
            .lock()
            .unwrap()
            .push((repo.to_string(), callback_url.to_string()));
        Ok(self.webhook_status)
    }

    async fn compare(&self, _token: &str, compare_url: &str) -> Result<Vec<ChangedFile>> {
        self.compare_calls.lock().unwrap().push(compare_url.to_string());
        Ok(self.files.clone())
    }

    async fn latest_commit_url(&self, _token: &str, _repo: &str) -> Result<Option<String>> {
        Ok(self.latest_commit.clone())
    }

    async fn commit_files(&self, _token: &str, commit_url: &str) -> Result<Vec<ChangedFile>> {
        self.commit_calls.lock().unwrap().push(commit_url.to_string());
        Ok(self.files.clone())
    }

    async fn blob_text(&self, _token: &str, contents_url: &str) -> Result<String> {
        if self.failing_blobs.contains(contents_url) {
            bail!("GitHub API returned 502 Bad Gateway for {}", contents_url);
        }
        match self.blobs.get(contents_url) {
            Some(text) => Ok(text.clone()),
            None => bail!("GitHub API returned 404 Not Found for {}", contents_url),
        }
    }
}

// ─── Embeddings ─────────────────────────────────────────────────────

/// Letter-frequency embedder: texts sharing letters point the same way.
pub struct LetterEmbedder;

pub fn letter_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 26];
    for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
        v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }

    fn dims(&self) -> usize {
        26
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| letter_vector(t)).collect())
    }
}

// ─── Chat model ─────────────────────────────────────────────────────

/// Returns queued responses in order (then `"ok"`) and records prompts.
#[derive(Default)]
pub struct ScriptedChatModel {
    responses: Mutex<VecDeque<String>>,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChatModel {
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn prompt_text(&self, call: usize) -> String {
        self.calls.lock().unwrap()[call]
            .iter()
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "ok".to_string()))
    }
}

// ─── Vector store ───────────────────────────────────────────────────

/// In-memory store that also records every write.
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemoryVectorStore,
    pub upserts: Mutex<Vec<(String, String)>>,
    pub deletes: Mutex<Vec<(String, String)>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upserted_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .upserts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        files.sort();
        files
    }
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn upsert_file(&self, project_id: &str, filename: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        self.upserts
            .lock()
            .unwrap()
            .push((project_id.to_string(), filename.to_string()));
        self.inner.upsert_file(project_id, filename, chunks).await
    }

    async fn delete_file(&self, project_id: &str, filename: &str) -> Result<u64> {
        self.deletes
            .lock()
            .unwrap()
            .push((project_id.to_string(), filename.to_string()));
        self.inner.delete_file(project_id, filename).await
    }

    async fn search(&self, project_id: &str, query_vec: &[f32], limit: usize) -> Result<Vec<RetrievedChunk>> {
        self.inner.search(project_id, query_vec, limit).await
    }

    async fn list_files(&self, project_id: &str) -> Result<Vec<String>> {
        self.inner.list_files(project_id).await
    }

    async fn file_text(&self, project_id: &str, filename: &str) -> Result<Option<String>> {
        self.inner.file_text(project_id, filename).await
    }
}

// ─── Analyzer ───────────────────────────────────────────────────────

/// Records which routine ran and answers `"<routine>:<project>"`.
#[derive(Default)]
pub struct RecordingAnalyzer {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingAnalyzer {
    fn record(&self, routine: &str, project_id: &str) -> Result<String> {
        self.calls.lock().unwrap().push(routine.to_string());
        Ok(format!("{}:{}", routine, project_id))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyzer for RecordingAnalyzer {
    async fn find_bugs(&self, _question: &str, project_id: &str) -> Result<String> {
        self.record("find_bugs", project_id)
    }

    async fn check_readability(&self, _question: &str, project_id: &str) -> Result<String> {
        self.record("check_readability", project_id)
    }

    async fn document_function(&self, _request: &DocRequest, project_id: &str) -> Result<String> {
        self.record("document_function", project_id)
    }

    async fn progress(&self, project_id: &str) -> Result<String> {
        self.record("progress", project_id)
    }

    async fn analyse_each_file(&self, project_id: &str) -> Result<String> {
        self.record("analyse_each_file", project_id)
    }
}

// ─── Wiring ─────────────────────────────────────────────────────────

/// Config rooted in `dir`, with `extra` TOML appended.
pub fn test_config(dir: &TempDir, extra: &str) -> Config {
    let db_path = dir.path().join("codelink.sqlite");
    let toml_str = format!(
        r#"
[db]
path = "{}"

[server]
bind = "127.0.0.1:0"
public_url = "https://codelink.test"

[sync]
min_changes = 5
concurrency = 2

{}
"#,
        db_path.display(),
        extra
    );
    toml::from_str(&toml_str).unwrap()
}

/// Services over a fresh SQLite database in `dir`.
pub async fn test_services(
    dir: &TempDir,
    extra_config: &str,
    github: Arc<FakeGitHub>,
    model: Arc<ScriptedChatModel>,
    store: Arc<RecordingStore>,
) -> Services {
    let config = test_config(dir, extra_config);
    let pool = db::connect(&config).await.unwrap();
    migrate::create_schema(&pool).await.unwrap();
    Services::new(config, pool, github, Arc::new(LetterEmbedder), model, store)
}

/// Register `repo` for client `login` and return the project id.
pub async fn register(services: &Services, login: &str, repo: &str, token: &str) -> String {
    services.projects.ensure_client(login, token).await.unwrap();
    services
        .projects
        .register_project(login, repo, token)
        .await
        .unwrap()
        .project
        .id
}
