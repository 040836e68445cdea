//! Webhook HTTP server

use crate::bot::RepoBot;
use crate::event::{parse_event, repository_of};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

type HmacSha256 = Hmac<Sha256>;

/// Bots keyed by `owner-repo`
#[derive(Default)]
pub struct ServerState {
    bots: HashMap<String, Arc<RepoBot>>,
}

impl ServerState {
    /// Build routing state from the configured bots
    pub fn new(bots: impl IntoIterator<Item = Arc<RepoBot>>) -> Self {
        Self {
            bots: bots
                .into_iter()
                .map(|bot| (bot.repo().key(), bot))
                .collect(),
        }
    }

    /// Bot for an `owner-repo` key
    pub fn bot(&self, key: &str) -> Option<&Arc<RepoBot>> {
        self.bots.get(key)
    }
}

/// Check an `X-Hub-Signature-256` value against the body
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Signature header value for `body`
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Router with `/ping` and `/webhook`
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/webhook", post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "message": "pong" }))
}

async fn webhook(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let repo = match repository_of(&body) {
        Ok(repo) => repo,
        Err(e) => {
            warn!(error = %e, "rejecting webhook");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    let Some(bot) = state.bot(&repo.key()) else {
        warn!(%repo, "webhook for unconfigured repository");
        return (StatusCode::INTERNAL_SERVER_ERROR, "unsupported repo").into_response();
    };

    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(bot.webhook_secret(), &body, signature) {
        error!(%repo, "invalid webhook signature");
        return (StatusCode::UNAUTHORIZED, "invalid signature").into_response();
    }

    let kind = headers
        .get("x-github-event")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    let event = match parse_event(kind, &body) {
        Ok(event) => event,
        Err(e) => {
            warn!(%repo, kind, error = %e, "unparseable webhook");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    debug!(%repo, kind, "accepted webhook");
    let bot = Arc::clone(bot);
    tokio::spawn(async move {
        if let Err(e) = bot.handle(event).await {
            warn!(repo = %bot.repo(), error = %e, "event handling failed");
        }
    });
    (StatusCode::OK, "ok").into_response()
}
