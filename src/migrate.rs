use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates every table and index if missing. Safe to call repeatedly.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Projects registered through webhook creation
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            auth_token TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clients (
            login TEXT PRIMARY KEY,
            auth_token TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS client_projects (
            login TEXT NOT NULL,
            project_id TEXT NOT NULL,
            name TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (login, project_id),
            FOREIGN KEY (login) REFERENCES clients(login)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_orgs (
            login TEXT PRIMARY KEY,
            score INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_projects (
            login TEXT NOT NULL,
            project_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (login, project_id),
            FOREIGN KEY (login) REFERENCES user_orgs(login)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Docs entries are kept as a JSON array; they are always read and
    // written as a whole per project.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS project_docs (
            project_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            client_req TEXT NOT NULL DEFAULT '',
            docs_json TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embedded_chunks (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(project_id, filename, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_embedded_chunks_file ON embedded_chunks(project_id, filename)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_projects_login ON user_projects(login)")
        .execute(pool)
        .await?;

    Ok(())
}
