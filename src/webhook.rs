//! GitHub push webhook receiver.
//!
//! `POST /webhook` accepts GitHub deliveries:
//!
//! - `ping` events are acknowledged without touching the sync pipeline;
//! - push events with a `base...head` range sync that comparison;
//! - push events without a range (a branch's first push) sync the
//!   repository's latest commit.
//!
//! When a webhook secret is configured every delivery must carry a valid
//! `X-Hub-Signature-256` header. Only the repository name and the commit
//! range are taken from the payload; the API URL that gets fetched with the
//! project's token is always built from `github.api_url`.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;

use crate::error::ServiceError;
use crate::services::Services;
use crate::sync::{compare_and_embed, ChangeSource};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const EVENT_HEADER: &str = "x-github-event";

#[derive(Debug, Deserialize)]
pub struct PushEvent {
    pub repository: Repository,
    #[serde(default)]
    pub compare: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

/// Check a `sha256=<hex>` signature against the raw body in constant time.
pub fn verify_signature(secret: &[u8], body: &[u8], header: Option<&str>) -> bool {
    let Some(hex_sig) = header.and_then(|h| h.strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// `sha256=<hex>` signature for `body`, as GitHub would send it.
pub fn sign(secret: &[u8], body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// The `base...head` range in the last segment of a push's `compare` link.
/// `None` when the push has no range or the range holds characters that
/// are not valid in a ref or sha.
pub fn compare_range(compare: &str) -> Option<&str> {
    let last = compare.trim_end_matches('/').rsplit('/').next()?;
    let (base, head) = last.split_once("...")?;
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '^' | '~'))
    };
    (valid(base) && valid(head)).then_some(last)
}

/// API comparison URL for `repo_full_name` over `range`.
pub fn compare_api_url(api_url: &str, repo_full_name: &str, range: &str) -> String {
    format!(
        "{}/repos/{}/compare/{}",
        api_url.trim_end_matches('/'),
        repo_full_name,
        range
    )
}

pub async fn handle_webhook(
    State(services): State<Services>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    if let Some(secret) = services.config.github.resolved_webhook_secret() {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if !verify_signature(secret.as_bytes(), &body, signature) {
            tracing::warn!("Rejected webhook delivery with invalid signature");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let event = headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok());
    process_event(&services, event, &body).await.map(Json)
}

/// Handle one (already authenticated) delivery.
pub async fn process_event(
    services: &Services,
    event: Option<&str>,
    body: &[u8],
) -> Result<Value, ServiceError> {
    if event == Some("ping") {
        tracing::info!("Received webhook ping");
        return Ok(json!({ "Mesage": "Ping Event" }));
    }

    let push: PushEvent = serde_json::from_slice(body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid push payload: {}", e)))?;
    let repo = push.repository.full_name.as_str();

    let project = services
        .projects
        .find_project_by_name(repo)
        .await?
        .filter(|p| !p.auth_token.is_empty());
    let Some(project) = project else {
        tracing::info!(repo, "Push for unregistered repository");
        return Ok(json!({ "Error": "Project does not exist" }));
    };

    let range = push.compare.as_deref().and_then(compare_range);

    let source = match range {
        Some(range) => ChangeSource::Compare(compare_api_url(
            &services.config.github.api_url,
            &project.name,
            range,
        )),
        None => match services
            .github
            .latest_commit_url(&project.auth_token, repo)
            .await?
        {
            Some(url) => ChangeSource::Commit(url),
            None => return Ok(json!({ "Error": "No commits found" })),
        },
    };

    let report = compare_and_embed(services, &project.auth_token, &project.id, &source).await?;

    Ok(json!({
        "Link": source.url(),
        "Report": report,
    }))
}
