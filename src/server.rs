//! HTTP surface: liveness probes and the webhook receiver.
//!
//! Liveness answers regardless of bot state. The webhook receiver checks the
//! lifecycle before touching the request, then validates, normalizes and
//! submits. Requests are handled independently and never serialized here.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Mode;
use crate::lifecycle::{Lifecycle, LifecycleError};
use crate::update::{parse_body, MalformedPayload};

/// Header Telegram uses to echo the secret given to `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Shared state for route handlers.
#[derive(Clone)]
struct AppState {
    lifecycle: Arc<Lifecycle>,
    webhook_secret: Option<Arc<SecretString>>,
}

/// Body of the liveness endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Liveness {
    /// `alive` on `/`, `healthy` on `/health`.
    pub status: &'static str,
    /// RFC 3339 UTC time of the response.
    pub timestamp: String,
}

impl Liveness {
    fn now(status: &'static str) -> Self {
        Self {
            status,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Build the router. `webhook_secret`, when set, must match the secret token
/// header on every webhook request.
pub fn build_router(lifecycle: Arc<Lifecycle>, webhook_secret: Option<SecretString>) -> Router {
    let state = AppState {
        lifecycle,
        webhook_secret: webhook_secret.map(Arc::new),
    };

    Router::new()
        .route("/", get(alive_handler))
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler))
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` fires.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

// ── Handlers ────────────────────────────────────────────────────

async fn alive_handler() -> Json<Liveness> {
    Json(Liveness::now("alive"))
}

async fn health_handler() -> Json<Liveness> {
    Json(Liveness::now("healthy"))
}

async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let lifecycle = &state.lifecycle;

    if !lifecycle.is_running() {
        debug!(state = %lifecycle.state(), "webhook rejected, bot not running");
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Bot is not running");
    }

    if lifecycle.mode() != Mode::Webhook {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Webhook delivery is disabled in polling mode",
        );
    }

    if let Some(expected) = &state.webhook_secret {
        let presented = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected.expose_secret().as_str()) {
            warn!("webhook rejected, secret token mismatch");
            return error_response(StatusCode::UNAUTHORIZED, "Invalid secret token");
        }
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let update = match parse_body(content_type, &body) {
        Ok(update) => update,
        Err(MalformedPayload::ContentType) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Content-Type must be application/json",
            );
        }
        Err(e) => {
            warn!(error = %e, "webhook payload rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "status": "error",
                    "message": "Malformed update payload",
                    "error": e.to_string(),
                })),
            )
                .into_response();
        }
    };

    match lifecycle.submit(update).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "success" }))).into_response(),
        Err(LifecycleError::NotRunning) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Bot is not running")
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "message": "Failed to process update",
                "error": e.to_string(),
            })),
        )
            .into_response(),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "status": "error", "message": message })),
    )
        .into_response()
}
