//! Account, project and documentation handlers.
//!
//! Every route here is a `POST` whose JSON body carries the caller's
//! GitHub token as `{"authToken": {"data": "<token>"}}`. The token is
//! resolved to a login through [`GitHubApi::user`](crate::github::GitHubApi::user)
//! and all membership checks run against that login.
//!
//! Client routes check `client_projects`; user routes check
//! `user_projects`. Response keys (`Message`, `Projects`, `Docs`, ...) are
//! the ones existing front ends read.

use axum::{
    extract::{FromRequest, Query, Request, State},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{DocEntry, ProjectDocs};
use crate::projects::DocsEdit;
use crate::services::Services;

type ApiResult = Result<Json<Value>, ServiceError>;

/// JSON body extractor whose rejections become `400` error bodies.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))?;
        Ok(ApiJson(value))
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthToken {
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthBody {
    #[serde(rename = "authToken")]
    pub auth_token: AuthToken,
}

#[derive(Debug, Deserialize)]
pub struct RequirementsBody {
    #[serde(rename = "authToken")]
    pub auth_token: AuthToken,
    #[serde(default)]
    pub requirements: String,
}

#[derive(Debug, Deserialize)]
pub struct UserProjectBody {
    #[serde(rename = "authToken")]
    pub auth_token: AuthToken,
    #[serde(rename = "projectID")]
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(DocEntry),
    Many(Vec<DocEntry>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<DocEntry> {
        match self {
            OneOrMany::One(entry) => vec![entry],
            OneOrMany::Many(entries) => entries,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddDocsBody {
    #[serde(rename = "authToken")]
    pub auth_token: AuthToken,
    pub doc: OneOrMany,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDocsBody {
    #[serde(rename = "authToken")]
    pub auth_token: AuthToken,
    #[serde(rename = "userDocs")]
    pub user_docs: Vec<DocEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    #[serde(rename = "delId")]
    pub del_id: Option<String>,
}

impl ProjectQuery {
    fn project_id(&self) -> Result<&str, ServiceError> {
        required(self.project_id.as_deref(), "projectId")
    }
}

#[derive(Debug, Deserialize)]
pub struct RepoQuery {
    #[serde(rename = "repoName")]
    pub repo_name: Option<String>,
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ServiceError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ServiceError::BadRequest(format!("{} is required", name)))
}

/// Resolve the GitHub login behind a token.
async fn login_for(services: &Services, token: &AuthToken) -> Result<String, ServiceError> {
    if token.data.trim().is_empty() {
        return Err(ServiceError::BadRequest("authToken is required".to_string()));
    }
    match services.github.user(&token.data).await {
        Ok(user) => Ok(user.login),
        Err(e) => {
            tracing::warn!("GitHub token lookup failed: {:#}", e);
            Err(ServiceError::Unauthorized(
                "Invalid GitHub token".to_string(),
            ))
        }
    }
}

/// Fail unless `login` is a client holding `project_id`.
async fn require_client_project(
    services: &Services,
    login: &str,
    project_id: &str,
) -> Result<(), ServiceError> {
    let client = services
        .projects
        .get_client(login)
        .await?
        .ok_or_else(|| ServiceError::Forbidden("No such client found".to_string()))?;
    if !client.projects.iter().any(|p| p.project_id == project_id) {
        return Err(ServiceError::Forbidden(
            "No such project for client exists".to_string(),
        ));
    }
    Ok(())
}

/// Fail unless `login` is a user holding `project_id`.
async fn require_user_project(
    services: &Services,
    login: &str,
    project_id: &str,
) -> Result<(), ServiceError> {
    let user = services
        .projects
        .get_user(login)
        .await?
        .ok_or_else(|| ServiceError::Forbidden("No such user exists".to_string()))?;
    if !user.projects.iter().any(|p| p == project_id) {
        return Err(ServiceError::Forbidden(
            "User not in this project".to_string(),
        ));
    }
    Ok(())
}

async fn docs_or_404(services: &Services, project_id: &str) -> Result<ProjectDocs, ServiceError> {
    services
        .projects
        .get_docs(project_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Project docs donot exist".to_string()))
}

async fn project_name(services: &Services, project_id: &str) -> ApiResult {
    let project = services
        .projects
        .get_project(project_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("No such project".to_string()))?;
    Ok(Json(json!({ "name": project.name })))
}

// ============ Repositories & webhooks ============

/// `POST /repos`: the caller's GitHub repositories.
pub async fn list_repos(
    State(services): State<Services>,
    ApiJson(body): ApiJson<AuthBody>,
) -> ApiResult {
    let login = login_for(&services, &body.auth_token).await?;
    let repos = services
        .github
        .list_repos(&body.auth_token.data, &login)
        .await?;
    Ok(Json(json!({ "Repos": repos })))
}

/// `POST /webhook/create?repoName=`: register the push webhook and link
/// the repository to the calling client.
pub async fn create_webhook(
    State(services): State<Services>,
    Query(query): Query<RepoQuery>,
    ApiJson(body): ApiJson<AuthBody>,
) -> ApiResult {
    let repo = required(query.repo_name.as_deref(), "repoName")?;
    let token = &body.auth_token.data;
    let login = login_for(&services, &body.auth_token).await?;
    services.projects.ensure_client(&login, token).await?;

    let callback = services.config.server.webhook_url();
    let status = services
        .github
        .create_webhook(token, repo, &callback)
        .await?;

    if status != 201 {
        tracing::warn!(repo, status, "Webhook creation failed");
        return Ok(Json(json!({
            "Message": format!("Some Error occured. {}", status)
        })));
    }

    tracing::info!(repo, "Webhook created");
    let registration = services.projects.register_project(&login, repo, token).await?;
    Ok(Json(json!({
        "Message": "Success",
        "ProjectId": registration.project.id,
    })))
}

// ============ Client routes ============

/// `POST /client/projects`
pub async fn client_projects(
    State(services): State<Services>,
    ApiJson(body): ApiJson<AuthBody>,
) -> ApiResult {
    let login = login_for(&services, &body.auth_token).await?;
    let client = services
        .projects
        .ensure_client(&login, &body.auth_token.data)
        .await?;
    Ok(Json(json!({ "Projects": client.projects })))
}

/// `POST /client/requirements?projectId=`
pub async fn get_requirements(
    State(services): State<Services>,
    Query(query): Query<ProjectQuery>,
    ApiJson(body): ApiJson<AuthBody>,
) -> ApiResult {
    let project_id = query.project_id()?;
    let login = login_for(&services, &body.auth_token).await?;
    require_client_project(&services, &login, project_id).await?;

    let docs = docs_or_404(&services, project_id).await?;
    Ok(Json(json!({
        "Message": "Success",
        "ClientRequirements": docs.client_req,
    })))
}

/// `POST /client/requirements/new?projectId=`
pub async fn new_requirements(
    State(services): State<Services>,
    Query(query): Query<ProjectQuery>,
    ApiJson(body): ApiJson<RequirementsBody>,
) -> ApiResult {
    let project_id = query.project_id()?;
    let login = login_for(&services, &body.auth_token).await?;
    require_client_project(&services, &login, project_id).await?;

    let name = services
        .projects
        .get_project(project_id)
        .await?
        .map(|p| p.name)
        .unwrap_or_else(|| project_id.to_string());
    services
        .projects
        .upsert_requirements(project_id, &name, &body.requirements)
        .await?;
    Ok(Json(json!({ "Message": "Success" })))
}

/// `POST /client/requirements/update?projectId=`
pub async fn update_requirements(
    State(services): State<Services>,
    Query(query): Query<ProjectQuery>,
    ApiJson(body): ApiJson<RequirementsBody>,
) -> ApiResult {
    let project_id = query.project_id()?;
    let login = login_for(&services, &body.auth_token).await?;
    require_client_project(&services, &login, project_id).await?;

    if !services
        .projects
        .set_requirements(project_id, &body.requirements)
        .await?
    {
        return Err(ServiceError::NotFound("Project docs donot exist".to_string()));
    }
    Ok(Json(json!({ "Message": "Success" })))
}

/// `POST /client/project/details?projectId=`
pub async fn client_project_details(
    State(services): State<Services>,
    Query(query): Query<ProjectQuery>,
    ApiJson(body): ApiJson<AuthBody>,
) -> ApiResult {
    let project_id = query.project_id()?;
    let login = login_for(&services, &body.auth_token).await?;
    require_client_project(&services, &login, project_id).await?;

    let docs = docs_or_404(&services, project_id).await?;
    Ok(Json(serde_json::to_value(docs).map_err(anyhow::Error::from)?))
}

/// `POST /client/project/name?projectId=`
pub async fn client_project_name(
    State(services): State<Services>,
    Query(query): Query<ProjectQuery>,
    ApiJson(body): ApiJson<AuthBody>,
) -> ApiResult {
    let project_id = query.project_id()?;
    let login = login_for(&services, &body.auth_token).await?;
    require_client_project(&services, &login, project_id).await?;
    project_name(&services, project_id).await
}

// ============ User routes ============

/// `POST /user/new`
pub async fn new_user(
    State(services): State<Services>,
    ApiJson(body): ApiJson<AuthBody>,
) -> ApiResult {
    let login = login_for(&services, &body.auth_token).await?;
    let (user, created) = services.projects.ensure_user(&login).await?;
    if created {
        tracing::info!(login = %login, "New user created");
    }
    Ok(Json(json!({ "Details": user })))
}

/// `POST /user/projects`
pub async fn user_projects(
    State(services): State<Services>,
    ApiJson(body): ApiJson<AuthBody>,
) -> ApiResult {
    let login = login_for(&services, &body.auth_token).await?;
    let user = services
        .projects
        .get_user(&login)
        .await?
        .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
    Ok(Json(json!({ "Projects": user.projects })))
}

/// `POST /user/projects/add`
pub async fn add_user_project(
    State(services): State<Services>,
    ApiJson(body): ApiJson<UserProjectBody>,
) -> ApiResult {
    let login = login_for(&services, &body.auth_token).await?;
    if services.projects.get_user(&login).await?.is_none() {
        return Err(ServiceError::NotFound("User not found".to_string()));
    }
    let project_id = required(Some(body.project_id.as_str()), "projectID")?;
    let added = services.projects.add_user_project(&login, project_id).await?;
    Ok(Json(json!({ "Message": "Success", "Added": added })))
}

/// `POST /user/projects/delete`
pub async fn delete_user_project(
    State(services): State<Services>,
    ApiJson(body): ApiJson<UserProjectBody>,
) -> ApiResult {
    let login = login_for(&services, &body.auth_token).await?;
    if services.projects.get_user(&login).await?.is_none() {
        return Err(ServiceError::NotFound("User not found".to_string()));
    }
    let removed = services
        .projects
        .remove_user_project(&login, &body.project_id)
        .await?;
    Ok(Json(json!({ "Message": "Success", "Removed": removed })))
}

/// `POST /user/docs?projectId=`: the caller's own entries.
pub async fn user_docs(
    State(services): State<Services>,
    Query(query): Query<ProjectQuery>,
    ApiJson(body): ApiJson<AuthBody>,
) -> ApiResult {
    let project_id = query.project_id()?;
    let login = login_for(&services, &body.auth_token).await?;
    require_user_project(&services, &login, project_id).await?;

    let docs = docs_or_404(&services, project_id).await?;
    let mine: Vec<DocEntry> = docs
        .docs
        .into_iter()
        .filter(|d| d.username == login)
        .collect();
    Ok(Json(json!({ "Message": "Success", "Docs": mine })))
}

fn foreign_doc() -> ServiceError {
    ServiceError::Forbidden("Docs belong to another user".to_string())
}

fn docs_edit_result(outcome: DocsEdit) -> ApiResult {
    match outcome {
        DocsEdit::MissingRecord => Err(ServiceError::NotFound(
            "No project requirements exist".to_string(),
        )),
        DocsEdit::Forbidden => Err(foreign_doc()),
        DocsEdit::Applied(_) => Ok(Json(json!({ "Message": "Success" }))),
    }
}

/// `POST /user/docs/add?projectId=`: `doc` may be one entry or an array.
/// Entries without an id get a fresh one; entries without a username are
/// attributed to the caller. Entries naming another user are refused.
pub async fn add_user_docs(
    State(services): State<Services>,
    Query(query): Query<ProjectQuery>,
    ApiJson(body): ApiJson<AddDocsBody>,
) -> ApiResult {
    let project_id = query.project_id()?;
    let login = login_for(&services, &body.auth_token).await?;
    require_user_project(&services, &login, project_id).await?;

    let mut entries = body.doc.into_vec();
    for entry in entries.iter_mut() {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        if entry.username.is_empty() {
            entry.username = login.clone();
        } else if entry.username != login {
            return Err(foreign_doc());
        }
    }

    if !services.projects.append_docs(project_id, &entries).await? {
        return Err(ServiceError::NotFound(
            "No project requirements exist".to_string(),
        ));
    }
    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    Ok(Json(json!({ "Message": "Success", "Ids": ids })))
}

/// `POST /user/docs/update?projectId=`: replace the caller's entries by id.
pub async fn update_user_docs(
    State(services): State<Services>,
    Query(query): Query<ProjectQuery>,
    ApiJson(body): ApiJson<UpdateDocsBody>,
) -> ApiResult {
    let project_id = query.project_id()?;
    let login = login_for(&services, &body.auth_token).await?;
    require_user_project(&services, &login, project_id).await?;

    let outcome = services
        .projects
        .update_docs(project_id, &login, &body.user_docs)
        .await?;
    docs_edit_result(outcome)
}

/// `POST /user/docs/delete?projectId=&delId=`
pub async fn delete_user_doc(
    State(services): State<Services>,
    Query(query): Query<ProjectQuery>,
    ApiJson(body): ApiJson<AuthBody>,
) -> ApiResult {
    let project_id = query.project_id()?;
    let del_id = required(query.del_id.as_deref(), "delId")?;
    let login = login_for(&services, &body.auth_token).await?;
    require_user_project(&services, &login, project_id).await?;

    let outcome = services
        .projects
        .delete_doc(project_id, &login, del_id)
        .await?;
    docs_edit_result(outcome)
}

/// `POST /user/project/details?projectId=`
pub async fn user_project_details(
    State(services): State<Services>,
    Query(query): Query<ProjectQuery>,
    ApiJson(body): ApiJson<AuthBody>,
) -> ApiResult {
    let project_id = query.project_id()?;
    let login = login_for(&services, &body.auth_token).await?;
    require_user_project(&services, &login, project_id).await?;

    let docs = docs_or_404(&services, project_id).await?;
    Ok(Json(serde_json::to_value(docs).map_err(anyhow::Error::from)?))
}

/// `POST /user/project/name?projectId=`
pub async fn user_project_name(
    State(services): State<Services>,
    Query(query): Query<ProjectQuery>,
    ApiJson(body): ApiJson<AuthBody>,
) -> ApiResult {
    let project_id = query.project_id()?;
    let login = login_for(&services, &body.auth_token).await?;
    require_user_project(&services, &login, project_id).await?;
    project_name(&services, project_id).await
}
