//! Project, account and documentation records.
//!
//! [`ProjectStore`] wraps the SQLite pool and owns every query against the
//! `projects`, `clients`, `client_projects`, `user_orgs`, `user_projects`
//! and `project_docs` tables. New clients and users start with no projects.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{Client, DocEntry, Project, ProjectDocs, ProjectRef, UserOrg};

pub struct ProjectStore {
    pool: SqlitePool,
    // Docs entries are rewritten as a whole; serialize read-modify-write.
    docs_write: Mutex<()>,
}

/// Outcome of a write to a project's documentation entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocsEdit {
    /// The project has no docs record.
    MissingRecord,
    /// An addressed entry belongs to another user; nothing was written.
    Forbidden,
    /// Number of entries added, replaced or removed.
    Applied(usize),
}

/// Result of registering a repository.
#[derive(Debug, Clone)]
pub struct Registration {
    pub project: Project,
    pub created: bool,
}

impl ProjectStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            docs_write: Mutex::new(()),
        }
    }

    // ============ Projects ============

    pub async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT id, name, auth_token, created_at FROM projects WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| project_from_row(&r)).transpose()
    }

    pub async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT id, name, auth_token, created_at FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| project_from_row(&r)).transpose()
    }

    /// Register `repo_name` for client `login`. An already registered
    /// repository is returned unchanged. A new one gets an empty docs
    /// record and is added to the client's project list.
    pub async fn register_project(
        &self,
        login: &str,
        repo_name: &str,
        auth_token: &str,
    ) -> Result<Registration> {
        if let Some(project) = self.find_project_by_name(repo_name).await? {
            tracing::info!(repo = repo_name, "Project already exists; no action taken");
            return Ok(Registration {
                project,
                created: false,
            });
        }

        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: repo_name.to_string(),
            auth_token: auth_token.to_string(),
            created_at: chrono::Utc::now().timestamp(),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO projects (id, name, auth_token, created_at) VALUES (?, ?, ?, ?)")
            .bind(&project.id)
            .bind(&project.name)
            .bind(&project.auth_token)
            .bind(project.created_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO project_docs (project_id, name, client_req, docs_json) VALUES (?, ?, '', '[]')",
        )
        .bind(&project.id)
        .bind(&project.name)
        .execute(&mut *tx)
        .await?;

        let client_exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM clients WHERE login = ?")
                .bind(login)
                .fetch_one(&mut *tx)
                .await?;

        if client_exists {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO client_projects (login, project_id, name, position)
                VALUES (?, ?, ?, (SELECT COALESCE(MAX(position), -1) + 1 FROM client_projects WHERE login = ?))
                "#,
            )
            .bind(login)
            .bind(&project.id)
            .bind(&project.name)
            .bind(login)
            .execute(&mut *tx)
            .await?;
        } else {
            tracing::warn!(login, "No such client exists; project not linked");
        }

        tx.commit().await?;
        tracing::info!(login, repo = repo_name, project_id = %project.id, "New project registered");

        Ok(Registration {
            project,
            created: true,
        })
    }

    // ============ Clients ============

    /// Fetch the client record for `login`, creating an empty one if needed.
    pub async fn ensure_client(&self, login: &str, auth_token: &str) -> Result<Client> {
        let inserted = sqlx::query("INSERT OR IGNORE INTO clients (login, auth_token) VALUES (?, ?)")
            .bind(login)
            .bind(auth_token)
            .execute(&self.pool)
            .await?;
        if inserted.rows_affected() > 0 {
            tracing::info!(login, "New client created");
        }

        self.get_client(login)
            .await?
            .with_context(|| format!("client {} missing after insert", login))
    }

    pub async fn get_client(&self, login: &str) -> Result<Option<Client>> {
        let token: Option<String> =
            sqlx::query_scalar("SELECT auth_token FROM clients WHERE login = ?")
                .bind(login)
                .fetch_optional(&self.pool)
                .await?;
        let Some(auth_token) = token else {
            return Ok(None);
        };

        let rows = sqlx::query(
            "SELECT project_id, name FROM client_projects WHERE login = ? ORDER BY position",
        )
        .bind(login)
        .fetch_all(&self.pool)
        .await?;

        let projects = rows
            .iter()
            .map(|r| -> Result<ProjectRef> {
                Ok(ProjectRef {
                    name: r.try_get("name")?,
                    project_id: r.try_get("project_id")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Client {
            login: login.to_string(),
            auth_token,
            projects,
        }))
    }

    // ============ Users ============

    /// Fetch the user record for `login`, creating one with score 0 if
    /// needed. The flag reports whether it was created.
    pub async fn ensure_user(&self, login: &str) -> Result<(UserOrg, bool)> {
        let inserted = sqlx::query("INSERT OR IGNORE INTO user_orgs (login, score) VALUES (?, 0)")
            .bind(login)
            .execute(&self.pool)
            .await?;
        let user = self
            .get_user(login)
            .await?
            .with_context(|| format!("user {} missing after insert", login))?;
        Ok((user, inserted.rows_affected() > 0))
    }

    pub async fn get_user(&self, login: &str) -> Result<Option<UserOrg>> {
        let score: Option<i64> = sqlx::query_scalar("SELECT score FROM user_orgs WHERE login = ?")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;
        let Some(score) = score else {
            return Ok(None);
        };

        let projects: Vec<String> = sqlx::query_scalar(
            "SELECT project_id FROM user_projects WHERE login = ? ORDER BY position",
        )
        .bind(login)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(UserOrg {
            login: login.to_string(),
            projects,
            score,
        }))
    }

    /// Add a project id to the user's set. Returns false if already present.
    pub async fn add_user_project(&self, login: &str, project_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO user_projects (login, project_id, position)
            VALUES (?, ?, (SELECT COALESCE(MAX(position), -1) + 1 FROM user_projects WHERE login = ?))
            "#,
        )
        .bind(login)
        .bind(project_id)
        .bind(login)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a project id from the user's set. Returns false if absent.
    pub async fn remove_user_project(&self, login: &str, project_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_projects WHERE login = ? AND project_id = ?")
            .bind(login)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ============ Docs ============

    pub async fn get_docs(&self, project_id: &str) -> Result<Option<ProjectDocs>> {
        let row = sqlx::query(
            "SELECT project_id, name, client_req, docs_json FROM project_docs WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let docs_json: String = row.try_get("docs_json")?;
        let docs: Vec<DocEntry> = serde_json::from_str(&docs_json)
            .with_context(|| format!("corrupt docs for project {}", project_id))?;

        Ok(Some(ProjectDocs {
            project_id: row.try_get("project_id")?,
            name: row.try_get("name")?,
            client_req: row.try_get("client_req")?,
            docs,
        }))
    }

    /// Create the docs record with `requirements`, or overwrite the
    /// requirements of an existing one. Entries are kept.
    pub async fn upsert_requirements(
        &self,
        project_id: &str,
        name: &str,
        requirements: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO project_docs (project_id, name, client_req, docs_json)
            VALUES (?, ?, ?, '[]')
            ON CONFLICT(project_id) DO UPDATE SET client_req = excluded.client_req
            "#,
        )
        .bind(project_id)
        .bind(name)
        .bind(requirements)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns false when the project has no docs record.
    pub async fn set_requirements(&self, project_id: &str, requirements: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE project_docs SET client_req = ? WHERE project_id = ?")
            .bind(requirements)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Append entries. Returns false when the project has no docs record.
    pub async fn append_docs(&self, project_id: &str, entries: &[DocEntry]) -> Result<bool> {
        let outcome = self
            .modify_docs(project_id, |docs| {
                docs.extend_from_slice(entries);
                DocsEdit::Applied(entries.len())
            })
            .await?;
        Ok(outcome != DocsEdit::MissingRecord)
    }

    /// Replace `owner`'s entries whose id matches one in `updates`. Nothing
    /// is written if any update addresses another user's entry.
    pub async fn update_docs(
        &self,
        project_id: &str,
        owner: &str,
        updates: &[DocEntry],
    ) -> Result<DocsEdit> {
        self.modify_docs(project_id, |docs| {
            let foreign = docs
                .iter()
                .any(|d| d.username != owner && updates.iter().any(|u| u.id == d.id));
            if foreign {
                return DocsEdit::Forbidden;
            }

            let mut replaced = 0;
            for doc in docs.iter_mut() {
                if let Some(new) = updates.iter().find(|u| u.id == doc.id) {
                    *doc = DocEntry {
                        username: owner.to_string(),
                        ..new.clone()
                    };
                    replaced += 1;
                }
            }
            DocsEdit::Applied(replaced)
        })
        .await
    }

    /// Remove `owner`'s entry `doc_id`.
    pub async fn delete_doc(&self, project_id: &str, owner: &str, doc_id: &str) -> Result<DocsEdit> {
        self.modify_docs(project_id, |docs| {
            if docs.iter().any(|d| d.id == doc_id && d.username != owner) {
                return DocsEdit::Forbidden;
            }
            let before = docs.len();
            docs.retain(|d| d.id != doc_id);
            DocsEdit::Applied(before - docs.len())
        })
        .await
    }

    /// Read-modify-write of a project's entries; written back only when
    /// `edit` returns [`DocsEdit::Applied`].
    async fn modify_docs<F>(&self, project_id: &str, edit: F) -> Result<DocsEdit>
    where
        F: FnOnce(&mut Vec<DocEntry>) -> DocsEdit + Send,
    {
        let _guard = self.docs_write.lock().await;

        let Some(mut record) = self.get_docs(project_id).await? else {
            return Ok(DocsEdit::MissingRecord);
        };
        let outcome = edit(&mut record.docs);
        if !matches!(outcome, DocsEdit::Applied(_)) {
            return Ok(outcome);
        }

        sqlx::query("UPDATE project_docs SET docs_json = ? WHERE project_id = ?")
            .bind(serde_json::to_string(&record.docs)?)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(outcome)
    }
}

fn project_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Project> {
    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        auth_token: row.try_get("auth_token")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::create_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> (ProjectStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("p.sqlite").display());
        let pool = SqlitePoolOptions::new().connect(&url).await.unwrap();
        create_schema(&pool).await.unwrap();
        (ProjectStore::new(pool), dir)
    }

    fn entry(id: &str, user: &str) -> DocEntry {
        DocEntry {
            id: id.to_string(),
            function_name: format!("fn_{}", id),
            username: user.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_links_client_and_creates_docs() {
        let (store, _dir) = store().await;
        let client = store.ensure_client("octo", "tok").await.unwrap();
        assert!(client.projects.is_empty());

        let reg = store.register_project("octo", "octo/widgets", "tok").await.unwrap();
        assert!(reg.created);

        let again = store.register_project("octo", "octo/widgets", "other").await.unwrap();
        assert!(!again.created);
        assert_eq!(again.project.id, reg.project.id);
        assert_eq!(again.project.auth_token, "tok");

        let client = store.get_client("octo").await.unwrap().unwrap();
        assert_eq!(client.projects.len(), 1);
        assert_eq!(client.projects[0].project_id, reg.project.id);

        let docs = store.get_docs(&reg.project.id).await.unwrap().unwrap();
        assert_eq!(docs.name, "octo/widgets");
        assert!(docs.docs.is_empty());
    }

    #[tokio::test]
    async fn test_user_projects_add_remove() {
        let (store, _dir) = store().await;
        let (user, created) = store.ensure_user("ana").await.unwrap();
        assert!(created);
        assert!(user.projects.is_empty());
        let (_, created) = store.ensure_user("ana").await.unwrap();
        assert!(!created);

        assert!(store.add_user_project("ana", "p1").await.unwrap());
        assert!(!store.add_user_project("ana", "p1").await.unwrap());
        assert!(store.add_user_project("ana", "p2").await.unwrap());
        assert_eq!(store.get_user("ana").await.unwrap().unwrap().projects, vec!["p1", "p2"]);

        assert!(store.remove_user_project("ana", "p1").await.unwrap());
        assert_eq!(store.get_user("ana").await.unwrap().unwrap().projects, vec!["p2"]);
    }

    #[tokio::test]
    async fn test_docs_append_update_delete_persist() {
        let (store, _dir) = store().await;
        assert!(!store.append_docs("missing", &[entry("a", "ana")]).await.unwrap());

        store.upsert_requirements("p1", "p1", "req v1").await.unwrap();
        assert!(store
            .append_docs("p1", &[entry("a", "ana"), entry("b", "bo")])
            .await
            .unwrap());

        let mut changed = entry("a", "ana");
        changed.bugs = "off by one".to_string();
        assert_eq!(
            store.update_docs("p1", "ana", &[changed.clone()]).await.unwrap(),
            DocsEdit::Applied(1)
        );
        assert_eq!(store.delete_doc("p1", "bo", "b").await.unwrap(), DocsEdit::Applied(1));
        assert!(store.set_requirements("p1", "req v2").await.unwrap());

        let docs = store.get_docs("p1").await.unwrap().unwrap();
        assert_eq!(docs.client_req, "req v2");
        assert_eq!(docs.docs, vec![changed]);
    }

    #[tokio::test]
    async fn test_docs_edits_are_limited_to_owner() {
        let (store, _dir) = store().await;
        assert_eq!(
            store.delete_doc("missing", "ana", "a").await.unwrap(),
            DocsEdit::MissingRecord
        );

        store.upsert_requirements("p1", "p1", "req").await.unwrap();
        store
            .append_docs("p1", &[entry("a", "ana"), entry("b", "bo")])
            .await
            .unwrap();

        let mut hijack = entry("b", "ana");
        hijack.bugs = "rewritten".to_string();
        assert_eq!(
            store.update_docs("p1", "ana", &[entry("a", "ana"), hijack]).await.unwrap(),
            DocsEdit::Forbidden
        );
        assert_eq!(store.delete_doc("p1", "ana", "b").await.unwrap(), DocsEdit::Forbidden);

        // An update cannot reattribute an entry either.
        let mut renamed = entry("a", "bo");
        renamed.bugs = "fixed".to_string();
        assert_eq!(
            store.update_docs("p1", "ana", &[renamed]).await.unwrap(),
            DocsEdit::Applied(1)
        );

        let docs = store.get_docs("p1").await.unwrap().unwrap().docs;
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].username, "ana");
        assert_eq!(docs[0].bugs, "fixed");
        assert_eq!(docs[1], entry("b", "bo"));
    }
}
