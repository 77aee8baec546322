//! Vector storage for embedded file chunks.
//!
//! Every entry is tagged with `(project_id, filename)`. That pair is the
//! unit of replacement and deletion, and `project_id` is applied inside
//! every query before ranking so one project's code never surfaces in
//! another project's results.
//!
//! Two backends implement [`VectorStore`]:
//!
//! | Backend | Type | Notes |
//! |---------|------|-------|
//! | `sqlite` | [`sqlite::SqliteVectorStore`] | `embedded_chunks` table, f32 BLOBs, brute-force cosine |
//! | `memory` | [`memory::InMemoryVectorStore`] | process-local, used by tests and ephemeral runs |

pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::VectorStoreConfig;
use crate::models::{EmbeddedChunk, RetrievedChunk};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace every entry for `(project_id, filename)` with `chunks`.
    async fn upsert_file(
        &self,
        project_id: &str,
        filename: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<()>;

    /// Remove every entry for `(project_id, filename)`; returns how many went.
    async fn delete_file(&self, project_id: &str, filename: &str) -> Result<u64>;

    /// Nearest neighbours of `query_vec` within `project_id`, best first.
    async fn search(
        &self,
        project_id: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Distinct filenames stored for a project, sorted.
    async fn list_files(&self, project_id: &str) -> Result<Vec<String>>;

    /// A file's chunk texts joined in chunk order, if the file is stored.
    async fn file_text(&self, project_id: &str, filename: &str) -> Result<Option<String>>;
}

pub fn create_store(config: &VectorStoreConfig, pool: SqlitePool) -> Result<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "sqlite" => Ok(Arc::new(sqlite::SqliteVectorStore::new(pool))),
        "memory" => Ok(Arc::new(memory::InMemoryVectorStore::new())),
        other => bail!("Unknown vector_store backend: {}", other),
    }
}

/// Sort hits best-first and keep `limit`. Ties break on file then chunk
/// order so results are stable.
pub(crate) fn rank(mut hits: Vec<RetrievedChunk>, limit: usize) -> Vec<RetrievedChunk> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.filename.cmp(&b.filename))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    hits.truncate(limit);
    hits
}

pub(crate) fn join_chunk_texts<'a>(texts: impl Iterator<Item = &'a str>) -> String {
    texts.collect::<Vec<_>>().join("\n\n")
}
