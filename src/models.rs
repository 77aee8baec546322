//! Core data models shared by the sync, retrieval and account layers.
//!
//! Account-facing types keep the JSON field names existing clients already
//! send and expect (`projectID`, `clientReq`, ...), so their serde renames
//! are part of the wire contract.

use serde::{Deserialize, Serialize};

/// A repository registered through webhook creation.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: String,
    /// `owner/repo`
    pub name: String,
    pub auth_token: String,
    pub created_at: i64,
}

/// A project reference held by a client account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRef {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "projectID")]
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Client {
    #[serde(rename = "clientGithubUserName")]
    pub login: String,
    #[serde(skip_serializing)]
    pub auth_token: String,
    pub projects: Vec<ProjectRef>,
}

/// Developer-side account; `projects` holds project ids.
#[derive(Debug, Clone, Serialize)]
pub struct UserOrg {
    #[serde(rename = "userGithubUserName")]
    pub login: String,
    pub projects: Vec<String>,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocs {
    #[serde(rename = "projectID")]
    pub project_id: String,
    pub name: String,
    #[serde(rename = "clientReq")]
    pub client_req: String,
    pub docs: Vec<DocEntry>,
}

/// Per-function documentation written by a developer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub function_description: String,
    #[serde(default)]
    pub time_taken: String,
    #[serde(default)]
    pub bugs: String,
    #[serde(default)]
    pub username: String,
}

/// A piece of a file's text produced by the chunker.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk plus its embedding, tagged with the owning project.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub id: String,
    pub project_id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
    pub vector: Vec<f32>,
}

impl EmbeddedChunk {
    pub fn from_chunk(project_id: &str, chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id,
            project_id: project_id.to_string(),
            filename: chunk.filename,
            chunk_index: chunk.chunk_index,
            text: chunk.text,
            hash: chunk.hash,
            vector,
        }
    }
}

/// A vector search hit.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub filename: String,
    pub chunk_index: i64,
    pub text: String,
    pub score: f64,
}

/// One question/answer exchange in a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_docs_wire_names() {
        let docs = ProjectDocs {
            project_id: "p1".to_string(),
            name: "octo/widgets".to_string(),
            client_req: "ship it".to_string(),
            docs: vec![],
        };
        let json = serde_json::to_value(&docs).unwrap();
        assert_eq!(json["projectID"], "p1");
        assert_eq!(json["clientReq"], "ship it");
    }

    #[test]
    fn test_doc_entry_missing_fields_default() {
        let entry: DocEntry = serde_json::from_str(r#"{"id":"d1","username":"ana"}"#).unwrap();
        assert_eq!(entry.id, "d1");
        assert_eq!(entry.username, "ana");
        assert!(entry.function_name.is_empty());
    }
}
