//! Embedding sync: turn a push into vector-store writes.
//!
//! A push resolves to a list of changed files, either from a commit
//! comparison or from a single commit. Files are classified into added,
//! modified and removed sets, and every file becomes an independent unit
//! of work:
//!
//! - added or modified files with at least `sync.min_changes` changed lines
//!   are fetched, chunked, embedded and upserted under
//!   `(project_id, filename)`;
//! - smaller edits are skipped without any store write, except renames;
//! - removed files (including the old path of a rename) have all their
//!   entries deleted.
//!
//! Units run concurrently, at most `sync.concurrency` at a time. A failing
//! unit is recorded in the [`SyncReport`] and never stops the others.

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::chunk::chunk_text;
use crate::github::{ChangedFile, FileStatus};
use crate::models::EmbeddedChunk;
use crate::services::Services;

/// Where the changed-file list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSource {
    /// A commit-comparison API URL (`.../compare/base...head`).
    Compare(String),
    /// A single commit API URL.
    Commit(String),
}

impl ChangeSource {
    pub fn url(&self) -> &str {
        match self {
            ChangeSource::Compare(url) | ChangeSource::Commit(url) => url,
        }
    }
}

/// Changed files split by what the sync must do with them.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub added: Vec<ChangedFile>,
    pub modified: Vec<ChangedFile>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileFailure {
    pub filename: String,
    pub error: String,
}

/// Per-file outcomes of one sync. Each list is sorted by filename.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncReport {
    pub embedded: Vec<String>,
    pub deleted: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<FileFailure>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Unit {
    Embed(ChangedFile),
    Delete(String),
}

enum Outcome {
    Embedded(String),
    Deleted(String),
    Failed(FileFailure),
}

pub fn classify_files(files: Vec<ChangedFile>) -> ChangeSet {
    let mut set = ChangeSet::default();

    for file in files {
        match file.status {
            FileStatus::Added | FileStatus::Copied => set.added.push(file),
            FileStatus::Modified | FileStatus::Changed => set.modified.push(file),
            FileStatus::Removed => set.removed.push(file.filename),
            FileStatus::Renamed => {
                if let Some(old) = file.previous_filename.clone() {
                    set.removed.push(old);
                }
                set.added.push(file);
            }
            FileStatus::Unchanged => {}
            FileStatus::Unknown => {
                tracing::debug!(filename = %file.filename, "Ignoring file with unknown status");
            }
        }
    }

    set
}

/// Sync the files named by `source` into `project_id`'s vector entries.
///
/// Errors resolving the change list are returned; per-file errors are
/// reported in [`SyncReport::failed`].
pub async fn compare_and_embed(
    services: &Services,
    auth_token: &str,
    project_id: &str,
    source: &ChangeSource,
) -> Result<SyncReport> {
    if project_id.is_empty() {
        bail!("project id must not be empty");
    }

    let files = match source {
        ChangeSource::Compare(url) => services.github.compare(auth_token, url).await?,
        ChangeSource::Commit(url) => services.github.commit_files(auth_token, url).await?,
    };
    let changes = classify_files(files);

    tracing::info!(
        project_id,
        source = source.url(),
        added = changes.added.len(),
        modified = changes.modified.len(),
        removed = changes.removed.len(),
        "Syncing changed files"
    );

    let min_changes = services.config.sync.min_changes;
    let mut report = SyncReport::default();
    let mut units = Vec::new();

    for file in changes.added.into_iter().chain(changes.modified) {
        // A rename drops the old path, so the new path is always embedded.
        if file.changes < min_changes && file.status != FileStatus::Renamed {
            report.skipped.push(file.filename);
        } else {
            units.push(Unit::Embed(file));
        }
    }
    units.extend(changes.removed.into_iter().map(Unit::Delete));

    let outcomes: Vec<Outcome> = stream::iter(units)
        .map(|unit| run_unit(services, auth_token, project_id, unit))
        .buffer_unordered(services.config.sync.concurrency.max(1))
        .collect()
        .await;

    for outcome in outcomes {
        match outcome {
            Outcome::Embedded(f) => report.embedded.push(f),
            Outcome::Deleted(f) => report.deleted.push(f),
            Outcome::Failed(failure) => report.failed.push(failure),
        }
    }

    report.embedded.sort();
    report.deleted.sort();
    report.skipped.sort();
    report.failed.sort_by(|a, b| a.filename.cmp(&b.filename));

    tracing::info!(
        project_id,
        embedded = report.embedded.len(),
        deleted = report.deleted.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Sync complete"
    );

    Ok(report)
}

async fn run_unit(services: &Services, auth_token: &str, project_id: &str, unit: Unit) -> Outcome {
    match unit {
        Unit::Embed(file) => {
            let filename = file.filename.clone();
            match embed_file(services, auth_token, project_id, &file).await {
                Ok(()) => Outcome::Embedded(filename),
                Err(e) => failed(project_id, filename, e),
            }
        }
        Unit::Delete(filename) => {
            match services.vectors.delete_file(project_id, &filename).await {
                Ok(_) => Outcome::Deleted(filename),
                Err(e) => failed(project_id, filename, e),
            }
        }
    }
}

fn failed(project_id: &str, filename: String, err: anyhow::Error) -> Outcome {
    tracing::warn!(project_id, filename = %filename, "File sync failed: {:#}", err);
    Outcome::Failed(FileFailure {
        filename,
        error: format!("{:#}", err),
    })
}

async fn embed_file(
    services: &Services,
    auth_token: &str,
    project_id: &str,
    file: &ChangedFile,
) -> Result<()> {
    if file.contents_url.is_empty() {
        bail!("no contents URL for {}", file.filename);
    }

    let text = services
        .github
        .blob_text(auth_token, &file.contents_url)
        .await?;
    let chunks = chunk_text(&file.filename, &text, services.config.chunking.max_tokens);

    let vectors = if chunks.is_empty() {
        Vec::new()
    } else {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        services.embedder.embed(&texts).await?
    };
    if vectors.len() != chunks.len() {
        bail!(
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        );
    }

    let embedded: Vec<EmbeddedChunk> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| EmbeddedChunk::from_chunk(project_id, chunk, vector))
        .collect();

    services
        .vectors
        .upsert_file(project_id, &file.filename, &embedded)
        .await?;

    tracing::debug!(project_id, filename = %file.filename, chunks = embedded.len(), "Embedded file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, status: FileStatus, changes: u64) -> ChangedFile {
        ChangedFile {
            filename: name.to_string(),
            status,
            changes,
            contents_url: format!("https://api.github.test/contents/{}", name),
            previous_filename: None,
        }
    }

    #[test]
    fn test_classify_statuses() {
        let mut renamed = file("new/name.rs", FileStatus::Renamed, 0);
        renamed.previous_filename = Some("old/name.rs".to_string());

        let set = classify_files(vec![
            file("a.rs", FileStatus::Added, 10),
            file("b.rs", FileStatus::Modified, 3),
            file("c.rs", FileStatus::Removed, 40),
            file("d.rs", FileStatus::Changed, 6),
            file("e.rs", FileStatus::Unchanged, 0),
            file("f.rs", FileStatus::Copied, 9),
            renamed,
        ]);

        let added: Vec<&str> = set.added.iter().map(|f| f.filename.as_str()).collect();
        let modified: Vec<&str> = set.modified.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(added, vec!["a.rs", "f.rs", "new/name.rs"]);
        assert_eq!(modified, vec!["b.rs", "d.rs"]);
        assert_eq!(set.removed, vec!["c.rs", "old/name.rs"]);
    }

    #[test]
    fn test_change_source_url() {
        let source = ChangeSource::Commit("https://api.github.com/repos/o/r/commits/abc".into());
        assert!(source.url().ends_with("/abc"));
    }
}
