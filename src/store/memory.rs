//! In-memory [`VectorStore`] for tests and ephemeral runs.
//!
//! Entries live in a `HashMap` keyed by `(project_id, filename)` behind a
//! `std::sync::RwLock`. Search is brute-force cosine similarity over the
//! requesting project's entries only.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{EmbeddedChunk, RetrievedChunk};

use super::{join_chunk_texts, rank, VectorStore};

type FileKey = (String, String);

#[derive(Default)]
pub struct InMemoryVectorStore {
    files: RwLock<HashMap<FileKey, Vec<EmbeddedChunk>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<FileKey, Vec<EmbeddedChunk>>>> {
        self.files
            .read()
            .map_err(|_| anyhow::anyhow!("vector store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<FileKey, Vec<EmbeddedChunk>>>> {
        self.files
            .write()
            .map_err(|_| anyhow::anyhow!("vector store lock poisoned"))
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert_file(
        &self,
        project_id: &str,
        filename: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<()> {
        let key = (project_id.to_string(), filename.to_string());
        let mut files = self.write()?;
        if chunks.is_empty() {
            files.remove(&key);
        } else {
            let mut stored = chunks.to_vec();
            stored.sort_by_key(|c| c.chunk_index);
            files.insert(key, stored);
        }
        Ok(())
    }

    async fn delete_file(&self, project_id: &str, filename: &str) -> Result<u64> {
        let key = (project_id.to_string(), filename.to_string());
        let removed = self.write()?.remove(&key);
        Ok(removed.map(|c| c.len() as u64).unwrap_or(0))
    }

    async fn search(
        &self,
        project_id: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let files = self.read()?;
        let hits = files
            .iter()
            .filter(|((project, _), _)| project == project_id)
            .flat_map(|(_, chunks)| chunks.iter())
            .map(|c| RetrievedChunk {
                filename: c.filename.clone(),
                chunk_index: c.chunk_index,
                text: c.text.clone(),
                score: cosine_similarity(query_vec, &c.vector) as f64,
            })
            .collect();
        Ok(rank(hits, limit))
    }

    async fn list_files(&self, project_id: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .read()?
            .keys()
            .filter(|(project, _)| project == project_id)
            .map(|(_, filename)| filename.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn file_text(&self, project_id: &str, filename: &str) -> Result<Option<String>> {
        let key = (project_id.to_string(), filename.to_string());
        Ok(self
            .read()?
            .get(&key)
            .map(|chunks| join_chunk_texts(chunks.iter().map(|c| c.text.as_str()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(project: &str, file: &str, index: i64, text: &str, v: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            id: format!("{}-{}-{}", project, file, index),
            project_id: project.to_string(),
            filename: file.to_string(),
            chunk_index: index,
            text: text.to_string(),
            hash: String::new(),
            vector: v,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_previous_entries() {
        let store = InMemoryVectorStore::new();
        store
            .upsert_file(
                "p1",
                "a.rs",
                &[
                    chunk("p1", "a.rs", 0, "old0", vec![1.0, 0.0]),
                    chunk("p1", "a.rs", 1, "old1", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        store
            .upsert_file("p1", "a.rs", &[chunk("p1", "a.rs", 0, "new", vec![1.0, 0.0])])
            .await
            .unwrap();

        assert_eq!(
            store.file_text("p1", "a.rs").await.unwrap().as_deref(),
            Some("new")
        );
        assert_eq!(store.delete_file("p1", "a.rs").await.unwrap(), 1);
        assert!(store.file_text("p1", "a.rs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_is_scoped_to_project() {
        let store = InMemoryVectorStore::new();
        store
            .upsert_file("p1", "a.rs", &[chunk("p1", "a.rs", 0, "mine", vec![0.0, 1.0])])
            .await
            .unwrap();
        store
            .upsert_file("p2", "b.rs", &[chunk("p2", "b.rs", 0, "theirs", vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store.search("p1", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "mine");
        assert_eq!(store.list_files("p2").await.unwrap(), vec!["b.rs".to_string()]);
    }
}
