//! Authentication endpoints (directory login, bearer sessions).

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crgate_core::errors::{AuthFailure, FailureCategory, SessionError};
use crgate_core::models::Identity;

use crate::api::extract::{bearer_token, ApiJson};
use crate::api::status::{not_found, AppError};
use crate::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// The user object returned to the front end.
#[derive(Serialize)]
pub struct UserView {
    name: String,
    email: String,
    role: String,
    username: String,
}

impl From<&Identity> for UserView {
    fn from(identity: &Identity) -> Self {
        Self {
            name: identity.display_name.clone(),
            email: identity.email.clone(),
            role: identity.role.to_string(),
            username: identity.username.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    authenticated: bool,
    token: String,
    user: UserView,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
}

#[derive(Serialize)]
struct SessionResponse {
    authenticated: bool,
    user: UserView,
}

/// Failure body for the auth endpoints: `{authenticated:false, message}`.
pub struct LoginError {
    status: StatusCode,
    message: &'static str,
}

impl From<AuthFailure> for LoginError {
    fn from(failure: AuthFailure) -> Self {
        let status = match failure.category() {
            FailureCategory::BadRequest => StatusCode::BAD_REQUEST,
            FailureCategory::Rejected => StatusCode::UNAUTHORIZED,
            FailureCategory::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: failure.public_message(),
        }
    }
}

impl From<SessionError> for LoginError {
    fn from(err: SessionError) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: match err {
                SessionError::Unauthenticated => "Not authenticated",
                SessionError::Expired => "Session expired",
            },
        }
    }
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "authenticated": false,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ldap/auth", post(login).fallback(not_found))
        .route("/api/ldap/logout", post(logout).fallback(not_found))
        .route("/api/ldap/session", get(current_session).fallback(not_found))
}

async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, LoginError> {
    debug!(username = %body.username, "login attempt");

    // The directory call happens before the session lock is taken.
    let identity = state
        .verifier
        .authenticate(&body.username, &body.password)
        .await?;
    let session = state.sessions.issue(identity).await;

    Ok(Json(LoginResponse {
        authenticated: true,
        user: UserView::from(&session.identity),
        expires_at: session.expires_at.map(|at| at.to_rfc3339()),
        token: session.token,
    }))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::Unauthorized("missing or invalid Authorization header".into()))?;
    let revoked = state.sessions.revoke(token).await;

    Ok(Json(serde_json::json!({
        "success": true,
        "revoked": revoked,
    })))
}

async fn current_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, LoginError> {
    let token = bearer_token(&headers).ok_or(SessionError::Unauthenticated)?;
    let identity = state.sessions.resolve(token).await?;

    Ok(Json(SessionResponse {
        authenticated: true,
        user: UserView::from(&identity),
    }))
}

/// Resolve the caller's session from the Authorization header.
///
/// Returns `Ok(None)` when no bearer token was sent. A token that was sent
/// but is unknown or expired is always an error. When `web.require_session`
/// is enabled, a missing token is an error too.
pub async fn session_identity(
    state: &Arc<AppState>,
    headers: &HeaderMap,
) -> Result<Option<Identity>, AppError> {
    let Some(token) = bearer_token(headers) else {
        if state.config.web.require_session {
            return Err(AppError::Unauthorized(
                "missing or invalid Authorization header".into(),
            ));
        }
        return Ok(None);
    };

    match state.sessions.resolve(token).await {
        Ok(identity) => Ok(Some(identity)),
        Err(SessionError::Expired) => Err(AppError::Unauthorized("session expired".into())),
        Err(SessionError::Unauthenticated) => {
            Err(AppError::Unauthorized("session invalid".into()))
        }
    }
}
