//! Project-scoped nearest-neighbour retrieval.

use anyhow::Result;
use std::sync::Arc;

use crate::embedding::{embed_query, Embedder};
use crate::models::RetrievedChunk;
use crate::store::VectorStore;

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self {
            embedder,
            store,
            top_k,
        }
    }

    /// At most `top_k` chunks of `project_id`, most similar first. A blank
    /// query returns nothing and does not call the embedder.
    pub async fn retrieve(&self, query: &str, project_id: &str) -> Result<Vec<RetrievedChunk>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let hits = self.store.search(project_id, &query_vec, self.top_k).await?;
        tracing::debug!(project_id, hits = hits.len(), "Retrieved context");
        Ok(hits)
    }
}

/// Prompt context: chunk texts in rank order, separated by blank lines.
pub fn format_documents(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
