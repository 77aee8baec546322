//! Code analysis routines behind the non-conversational chat modes.
//!
//! [`Analyzer`] is the seam the chat dispatcher calls through; tests swap
//! in recording fakes. [`LlmAnalyzer`] implements each routine as one
//! retrieval (or a docs/file lookup) followed by a single model call.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::error::ServiceError;
use crate::llm::ChatModel;
use crate::models::{DocEntry, ProjectDocs};
use crate::projects::ProjectStore;
use crate::prompts::{
    task_prompt, BUGS_INSTRUCTION, DOCS_INSTRUCTION, FILE_ANALYSIS_INSTRUCTION,
    PROGRESS_INSTRUCTION, READABILITY_INSTRUCTION,
};
use crate::retriever::{format_documents, Retriever};
use crate::store::VectorStore;

/// Function details submitted with a `docs` request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DocRequest {
    pub function_name: String,
    pub description: String,
    pub time_taken: String,
    pub bugs: String,
    pub developer_name: String,
}

impl DocRequest {
    fn to_entry(&self) -> DocEntry {
        DocEntry {
            id: Uuid::new_v4().to_string(),
            function_name: self.function_name.clone(),
            function_description: self.description.clone(),
            time_taken: self.time_taken.clone(),
            bugs: self.bugs.clone(),
            username: self.developer_name.clone(),
        }
    }
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn find_bugs(&self, question: &str, project_id: &str) -> Result<String>;

    async fn check_readability(&self, question: &str, project_id: &str) -> Result<String>;

    /// Record the function's documentation entry, then write docs for it.
    async fn document_function(&self, request: &DocRequest, project_id: &str) -> Result<String>;

    async fn progress(&self, project_id: &str) -> Result<String>;

    async fn analyse_each_file(&self, project_id: &str) -> Result<String>;
}

pub struct LlmAnalyzer {
    retriever: Retriever,
    model: Arc<dyn ChatModel>,
    projects: Arc<ProjectStore>,
    vectors: Arc<dyn VectorStore>,
    chat: ChatConfig,
}

impl LlmAnalyzer {
    pub fn new(
        retriever: Retriever,
        model: Arc<dyn ChatModel>,
        projects: Arc<ProjectStore>,
        vectors: Arc<dyn VectorStore>,
        chat: ChatConfig,
    ) -> Self {
        Self {
            retriever,
            model,
            projects,
            vectors,
            chat,
        }
    }

    async fn ask_with_context(
        &self,
        instruction: &str,
        query: &str,
        task: &str,
        project_id: &str,
    ) -> Result<String> {
        let chunks = self.retriever.retrieve(query, project_id).await?;
        let context = format_documents(&chunks);
        let messages = task_prompt(instruction, &context, task, self.chat.max_prompt_chars);
        self.model.complete(&messages).await
    }

    async fn load_docs(&self, project_id: &str) -> Result<ProjectDocs> {
        self.projects
            .get_docs(project_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Project docs donot exist".to_string()).into())
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn find_bugs(&self, question: &str, project_id: &str) -> Result<String> {
        self.ask_with_context(BUGS_INSTRUCTION, question, question, project_id)
            .await
    }

    async fn check_readability(&self, question: &str, project_id: &str) -> Result<String> {
        self.ask_with_context(READABILITY_INSTRUCTION, question, question, project_id)
            .await
    }

    async fn document_function(&self, request: &DocRequest, project_id: &str) -> Result<String> {
        let entry = request.to_entry();
        if !self.projects.append_docs(project_id, &[entry]).await? {
            return Err(ServiceError::NotFound("Project docs donot exist".to_string()).into());
        }

        let query = format!("{} {}", request.function_name, request.description);
        let task = format!(
            "Function: {}\nDescription: {}\nTime taken: {}\nKnown bugs: {}\nDeveloper: {}",
            request.function_name,
            request.description,
            request.time_taken,
            request.bugs,
            request.developer_name
        );
        self.ask_with_context(DOCS_INSTRUCTION, &query, &task, project_id)
            .await
    }

    async fn progress(&self, project_id: &str) -> Result<String> {
        let docs = self.load_docs(project_id).await?;
        let entries: Vec<String> = docs
            .docs
            .iter()
            .map(|d| {
                format!(
                    "- {} ({}, {}): {} | bugs: {}",
                    d.function_name, d.username, d.time_taken, d.function_description, d.bugs
                )
            })
            .collect();
        let context = entries.join("\n");
        let task = format!(
            "Client requirements:\n{}\n\nSummarise the progress of {}.",
            docs.client_req, docs.name
        );

        let messages = task_prompt(
            PROGRESS_INSTRUCTION,
            &context,
            &task,
            self.chat.max_prompt_chars,
        );
        self.model.complete(&messages).await
    }

    async fn analyse_each_file(&self, project_id: &str) -> Result<String> {
        let files = self.vectors.list_files(project_id).await?;
        if files.is_empty() {
            return Ok("No embedded files found for this project.".to_string());
        }
        if files.len() > self.chat.max_files {
            tracing::info!(
                project_id,
                total = files.len(),
                analysed = self.chat.max_files,
                "Limiting per-file analysis"
            );
        }

        let mut sections = Vec::new();
        for filename in files.iter().take(self.chat.max_files) {
            let Some(text) = self.vectors.file_text(project_id, filename).await? else {
                continue;
            };
            let messages = task_prompt(
                FILE_ANALYSIS_INSTRUCTION,
                &text,
                &format!("File: {}", filename),
                self.chat.max_prompt_chars,
            );
            let analysis = self.model.complete(&messages).await?;
            sections.push(format!("## {}\n{}", filename, analysis.trim()));
        }

        Ok(sections.join("\n\n"))
    }
}
