//! Shared collaborators, built once and cloned into every handler.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::analysis::{Analyzer, LlmAnalyzer};
use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::github::{GitHubApi, GitHubClient};
use crate::llm::{create_chat_model, ChatModel};
use crate::memory::ConversationMemory;
use crate::migrate;
use crate::projects::ProjectStore;
use crate::retriever::Retriever;
use crate::store::{create_store, VectorStore};

#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub projects: Arc<ProjectStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub chat_model: Arc<dyn ChatModel>,
    pub github: Arc<dyn GitHubApi>,
    pub analyzer: Arc<dyn Analyzer>,
    pub memory: Arc<ConversationMemory>,
}

impl Services {
    /// Wire the given collaborators together with an [`LlmAnalyzer`].
    pub fn new(
        config: Config,
        pool: SqlitePool,
        github: Arc<dyn GitHubApi>,
        embedder: Arc<dyn Embedder>,
        chat_model: Arc<dyn ChatModel>,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        let config = Arc::new(config);
        let projects = Arc::new(ProjectStore::new(pool));
        let memory = Arc::new(ConversationMemory::new(
            config.chat.max_history_turns,
            config.chat.max_sessions,
        ));
        let retriever = Retriever::new(embedder.clone(), vectors.clone(), config.retrieval.top_k);
        let analyzer: Arc<dyn Analyzer> = Arc::new(LlmAnalyzer::new(
            retriever,
            chat_model.clone(),
            projects.clone(),
            vectors.clone(),
            config.chat.clone(),
        ));

        Self {
            config,
            projects,
            vectors,
            embedder,
            chat_model,
            github,
            analyzer,
            memory,
        }
    }

    /// Build the production stack from configuration: open the database,
    /// create the schema, and construct the configured providers.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::create_schema(&pool).await?;

        let vectors = create_store(&config.vector_store, pool.clone())?;
        let embedder = create_embedder(&config.embedding)?;
        let chat_model = create_chat_model(&config.llm)?;
        let github: Arc<dyn GitHubApi> = Arc::new(GitHubClient::new(&config.github)?);

        tracing::info!(
            embedding = embedder.model_name(),
            llm = chat_model.model_name(),
            vector_store = %config.vector_store.backend,
            "Services ready"
        );

        Ok(Self::new(
            config.clone(),
            pool,
            github,
            embedder,
            chat_model,
            vectors,
        ))
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(
            self.embedder.clone(),
            self.vectors.clone(),
            self.config.retrieval.top_k,
        )
    }
}
