//! HTTP surface: the OAuth login/callback endpoints and a small
//! informational router.
//!
//! Login is API-shaped (JSON errors, redirect on success). The callback is
//! browser-shaped: both outcomes render a short notice page that sends the
//! user back home after a delay, since the provider redirect lands in a
//! real browser tab.

use crate::auth::caller_identity;
use crate::error::AuthError;
use crate::oauth::{AuthPipeline, CallbackQuery};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Purpose recorded for logins started through this API.
const LOGIN_PURPOSE: &str = "chatbot";

/// How long the callback notice page lingers before returning home.
const REDIRECT_DELAY_SECONDS: u32 = 5;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for API endpoints
enum AppError {
    Unauthorized(String),
    NotFound(String),
    ServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Shared application state for the auth API
#[derive(Clone)]
pub struct AuthAppState {
    pub pipeline: Arc<AuthPipeline>,
}

/// Login query parameters
#[derive(Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    force_verify: bool,
}

/// Create the auth API router
pub fn create_auth_router(state: AuthAppState) -> Router {
    Router::new()
        .route("/auth/v1/:provider/login", get(login))
        .route("/auth/v1/callback", get(callback))
        .with_state(Arc::new(state))
}

/// GET /auth/v1/:provider/login
///
/// Starts an authorization: issues a CSRF state bound to the caller and
/// redirects to the provider's consent page.
async fn login(
    State(state): State<Arc<AuthAppState>>,
    Path(provider): Path<String>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
) -> Result<Redirect, AppError> {
    let user_id = caller_identity(&headers)
        .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

    debug!(user_id = %user_id, provider = %provider, "login requested");

    let url = state
        .pipeline
        .begin(&user_id, &provider, LOGIN_PURPOSE, query.force_verify)
        .map_err(|e| match e {
            AuthError::UnknownProvider(name) => {
                AppError::NotFound(format!("Provider '{}' not found", name))
            }
            other => {
                error!(error = %other, "failed to start authorization");
                AppError::ServerError("Failed to start authorization".to_string())
            }
        })?;

    Ok(Redirect::temporary(&url))
}

/// GET /auth/v1/callback
///
/// Provider redirect target. Runs the full callback pipeline and renders a
/// browser notice either way; failure detail goes to the logs, not the
/// page.
async fn callback(
    State(state): State<Arc<AuthAppState>>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    let identity = caller_identity(&headers).ok();

    match state.pipeline.complete(identity, query).await {
        Ok(outcome) => {
            debug!(user_id = %outcome.user_id, provider = %outcome.provider, "callback completed");
            Html(notice_page("authentication successful!")).into_response()
        }
        Err(e) => {
            warn!(error = %e, "callback failed");
            (
                StatusCode::BAD_REQUEST,
                Html(notice_page("authentication failed")),
            )
                .into_response()
        }
    }
}

/// Notice page shown after the provider redirect, with a delayed hop back
/// to the home page.
fn notice_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>lutra</title></head>
<body>
<p>{}</p>
<p>You will be sent back home in {} seconds.</p>
<script>setTimeout(function() {{ window.location.replace("/"); }}, {});</script>
</body>
</html>
"#,
        message,
        REDIRECT_DELAY_SECONDS,
        REDIRECT_DELAY_SECONDS * 1000
    )
}

/// Health response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

/// Version response
#[derive(Serialize)]
struct VersionResponse {
    name: &'static str,
    version: &'static str,
}

/// Create the informational router
pub fn create_info_router() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/version", get(version))
}

async fn root() -> &'static str {
    "hello world from lutra!"
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}
