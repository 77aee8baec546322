//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/chat` | Chat dispatch, plain-text answer |
//! | `POST` | `/webhook` | GitHub push webhook receiver |
//! | `POST` | `/webhook/create` | Register a repository webhook |
//! | `POST` | `/repos` | List the caller's repositories |
//! | `POST` | `/client/...` | Client projects and requirements |
//! | `POST` | `/user/...` | User projects and documentation entries |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "forbidden", "message": "User not in this project" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for browser front ends.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::accounts;
use crate::analysis::DocRequest;
use crate::chat::{ChatDispatcher, ChatMode, ChatRequest};
use crate::config::Config;
use crate::error::ServiceError;
use crate::services::Services;
use crate::webhook::handle_webhook;

/// Query string of `GET /chat`.
#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(rename = "type")]
    pub mode: Option<String>,
    pub session_id: Option<String>,
    #[serde(rename = "functionName", default)]
    pub function_name: String,
    #[serde(rename = "functionDescription", default)]
    pub function_description: String,
    #[serde(rename = "timeTaken", default)]
    pub time_taken: String,
    #[serde(default)]
    pub bugs: String,
    // Field name used by existing clients.
    #[serde(rename = "devloperName", default)]
    pub developer_name: String,
}

impl From<ChatQuery> for ChatRequest {
    fn from(query: ChatQuery) -> Self {
        ChatRequest {
            mode: ChatMode::from_type(query.mode.as_deref()),
            question: query.question,
            project_id: query.project_id,
            session_id: query.session_id,
            doc: DocRequest {
                function_name: query.function_name,
                description: query.function_description,
                time_taken: query.time_taken,
                bugs: query.bugs,
                developer_name: query.developer_name,
            },
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Build the application router over `services`.
pub fn router(services: Services) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", get(handle_chat))
        .route("/webhook", post(handle_webhook))
        .route("/webhook/create", post(accounts::create_webhook))
        .route("/repos", post(accounts::list_repos))
        .route("/client/projects", post(accounts::client_projects))
        .route("/client/requirements", post(accounts::get_requirements))
        .route("/client/requirements/new", post(accounts::new_requirements))
        .route(
            "/client/requirements/update",
            post(accounts::update_requirements),
        )
        .route(
            "/client/project/details",
            post(accounts::client_project_details),
        )
        .route("/client/project/name", post(accounts::client_project_name))
        .route("/user/new", post(accounts::new_user))
        .route("/user/projects", post(accounts::user_projects))
        .route("/user/projects/add", post(accounts::add_user_project))
        .route("/user/projects/delete", post(accounts::delete_user_project))
        .route("/user/docs", post(accounts::user_docs))
        .route("/user/docs/add", post(accounts::add_user_docs))
        .route("/user/docs/update", post(accounts::update_user_docs))
        .route("/user/docs/delete", post(accounts::delete_user_doc))
        .route(
            "/user/project/details",
            post(accounts::user_project_details),
        )
        .route("/user/project/name", post(accounts::user_project_name))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(services)
}

/// Serve `services` on an already bound listener until the process exits.
pub async fn serve(services: Services, listener: TcpListener) -> anyhow::Result<()> {
    axum::serve(listener, router(services)).await?;
    Ok(())
}

/// Start the server on `[server].bind`.
///
/// This is the entry point used by the `codelink serve` command.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    let listener = TcpListener::bind(&config.server.bind).await?;

    tracing::info!(
        bind = %config.server.bind,
        webhook = %config.server.webhook_url(),
        "codelink server listening"
    );
    println!("codelink server listening on {}", config.server.bind);

    serve(services, listener).await
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_chat(
    State(services): State<Services>,
    Query(query): Query<ChatQuery>,
) -> Result<String, ServiceError> {
    let request = ChatRequest::from(query);
    request.validate()?;

    let answer = ChatDispatcher::new(&services).dispatch(&request).await?;
    Ok(answer)
}
