//! Chat dispatcher.
//!
//! A request's `type` picks the mode. Analysis modes hand off to exactly
//! one [`Analyzer`] routine and return its text untouched. Anything else is
//! a conversational turn:
//!
//! 1. condense the follow-up and the session history into a standalone
//!    question (model call #1);
//! 2. retrieve that question's top chunks within the project;
//! 3. answer from the context and history (model call #2);
//! 4. remember the `(question, answer)` turn for the session.

use anyhow::Result;
use std::sync::Arc;

use crate::analysis::{Analyzer, DocRequest};
use crate::error::ServiceError;
use crate::llm::ChatModel;
use crate::memory::ConversationMemory;
use crate::models::Turn;
use crate::prompts::{answer_prompt, condense_prompt};
use crate::retriever::{format_documents, Retriever};
use crate::services::Services;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Bugs,
    Read,
    Docs,
    Progress,
    Complete,
    Conversational,
}

impl ChatMode {
    /// Parse the `type` query value. Unknown or missing values select
    /// [`ChatMode::Conversational`].
    pub fn from_type(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("bugs") => ChatMode::Bugs,
            Some("read") => ChatMode::Read,
            Some("docs") => ChatMode::Docs,
            Some("progress") => ChatMode::Progress,
            Some("complete") => ChatMode::Complete,
            _ => ChatMode::Conversational,
        }
    }

    fn needs_question(self) -> bool {
        matches!(
            self,
            ChatMode::Conversational | ChatMode::Bugs | ChatMode::Read
        )
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub question: String,
    pub project_id: String,
    pub mode: ChatMode,
    pub session_id: Option<String>,
    pub doc: DocRequest,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.project_id.trim().is_empty() {
            return Err(ServiceError::BadRequest("project_id is required".to_string()));
        }
        if self.mode.needs_question() && self.question.trim().is_empty() {
            return Err(ServiceError::BadRequest(
                "question must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Memory key: the explicit session, else the project.
    pub fn session_key(&self) -> &str {
        self.session_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.project_id)
    }
}

pub struct ChatDispatcher {
    analyzer: Arc<dyn Analyzer>,
    retriever: Retriever,
    model: Arc<dyn ChatModel>,
    memory: Arc<ConversationMemory>,
    max_prompt_chars: usize,
}

impl ChatDispatcher {
    pub fn new(services: &Services) -> Self {
        Self {
            analyzer: services.analyzer.clone(),
            retriever: services.retriever(),
            model: services.chat_model.clone(),
            memory: services.memory.clone(),
            max_prompt_chars: services.config.chat.max_prompt_chars,
        }
    }

    pub async fn dispatch(&self, request: &ChatRequest) -> Result<String> {
        let project_id = request.project_id.as_str();
        tracing::debug!(project_id, mode = ?request.mode, "Dispatching chat request");

        match request.mode {
            ChatMode::Bugs => self.analyzer.find_bugs(&request.question, project_id).await,
            ChatMode::Read => {
                self.analyzer
                    .check_readability(&request.question, project_id)
                    .await
            }
            ChatMode::Docs => {
                self.analyzer
                    .document_function(&request.doc, project_id)
                    .await
            }
            ChatMode::Progress => self.analyzer.progress(project_id).await,
            ChatMode::Complete => self.analyzer.analyse_each_file(project_id).await,
            ChatMode::Conversational => self.converse(request).await,
        }
    }

    async fn converse(&self, request: &ChatRequest) -> Result<String> {
        let session = request.session_key();
        let history = self.memory.history(session);

        let condense = condense_prompt(&history, &request.question, self.max_prompt_chars);
        let standalone = self.model.complete(&condense).await?;
        let standalone = match standalone.trim() {
            "" => request.question.as_str(),
            s => s,
        };

        let chunks = self.retriever.retrieve(standalone, &request.project_id).await?;
        let context = format_documents(&chunks);
        let answer_messages = answer_prompt(&context, &history, standalone, self.max_prompt_chars);
        let answer = self.model.complete(&answer_messages).await?;

        self.memory.append(
            session,
            Turn {
                question: request.question.clone(),
                answer: answer.clone(),
            },
        );
        tracing::debug!(
            session,
            sessions = self.memory.session_count(),
            "Recorded conversation turn"
        );

        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(mode: ChatMode, question: &str, project: &str) -> ChatRequest {
        ChatRequest {
            question: question.to_string(),
            project_id: project.to_string(),
            mode,
            session_id: None,
            doc: DocRequest::default(),
        }
    }

    #[test]
    fn test_mode_parsing_defaults_to_conversational() {
        assert_eq!(ChatMode::from_type(Some("bugs")), ChatMode::Bugs);
        assert_eq!(ChatMode::from_type(Some("complete")), ChatMode::Complete);
        assert_eq!(ChatMode::from_type(Some("summary")), ChatMode::Conversational);
        assert_eq!(ChatMode::from_type(None), ChatMode::Conversational);
    }

    #[test]
    fn test_validation() {
        assert!(request(ChatMode::Conversational, "hi", "p1").validate().is_ok());
        assert!(request(ChatMode::Conversational, " ", "p1").validate().is_err());
        assert!(request(ChatMode::Bugs, "hi", "").validate().is_err());
        assert!(request(ChatMode::Progress, "", "p1").validate().is_ok());
    }

    #[test]
    fn test_session_key_falls_back_to_project() {
        let mut req = request(ChatMode::Conversational, "hi", "p1");
        assert_eq!(req.session_key(), "p1");
        req.session_id = Some("s-42".to_string());
        assert_eq!(req.session_key(), "s-42");
    }
}
