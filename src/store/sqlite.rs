//! SQLite-backed [`VectorStore`].
//!
//! Vectors are stored as little-endian f32 BLOBs in `embedded_chunks`.
//! Search loads the requesting project's rows (the `WHERE project_id = ?`
//! filter runs in SQL) and ranks them by cosine similarity in process.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{EmbeddedChunk, RetrievedChunk};

use super::{join_chunk_texts, rank, VectorStore};

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert_file(
        &self,
        project_id: &str,
        filename: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM embedded_chunks WHERE project_id = ? AND filename = ?")
            .bind(project_id)
            .bind(filename)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO embedded_chunks (id, project_id, filename, chunk_index, text, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(project_id)
            .bind(filename)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(&chunk.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_file(&self, project_id: &str, filename: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM embedded_chunks WHERE project_id = ? AND filename = ?")
            .bind(project_id)
            .bind(filename)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn search(
        &self,
        project_id: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let rows = sqlx::query(
            "SELECT filename, chunk_index, text, embedding FROM embedded_chunks WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            let vector = blob_to_vec(&blob);
            hits.push(RetrievedChunk {
                filename: row.try_get("filename")?,
                chunk_index: row.try_get("chunk_index")?,
                text: row.try_get("text")?,
                score: cosine_similarity(query_vec, &vector) as f64,
            });
        }

        Ok(rank(hits, limit))
    }

    async fn list_files(&self, project_id: &str) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT filename FROM embedded_chunks WHERE project_id = ? ORDER BY filename",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn file_text(&self, project_id: &str, filename: &str) -> Result<Option<String>> {
        let texts: Vec<String> = sqlx::query_scalar(
            "SELECT text FROM embedded_chunks WHERE project_id = ? AND filename = ? ORDER BY chunk_index",
        )
        .bind(project_id)
        .bind(filename)
        .fetch_all(&self.pool)
        .await?;

        if texts.is_empty() {
            return Ok(None);
        }
        Ok(Some(join_chunk_texts(texts.iter().map(|t| t.as_str()))))
    }
}
