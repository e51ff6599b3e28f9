//! Change-request endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crgate_core::models::{BatchAction, BatchReceipt, BatchSelection, ChangeRequest};

use crate::api::auth::session_identity;
use crate::api::extract::ApiJson;
use crate::api::status::{not_found, AppError};
use crate::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchApproveRequest {
    #[serde(default)]
    pub ids: Vec<serde_json::Value>,
    #[serde(default)]
    pub approved_by: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRejectRequest {
    #[serde(default)]
    pub ids: Vec<serde_json::Value>,
    #[serde(default)]
    pub rejected_by: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApproveResponse {
    success: bool,
    message: String,
    approved_by: String,
    approved_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectResponse {
    success: bool,
    message: String,
    rejected_by: String,
    rejected_at: String,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/change-requests",
            get(list_change_requests).fallback(not_found),
        )
        .route(
            "/api/change-requests/batch-approve",
            post(batch_approve).fallback(not_found),
        )
        .route(
            "/api/change-requests/batch-reject",
            post(batch_reject).fallback(not_found),
        )
}

async fn list_change_requests(State(state): State<Arc<AppState>>) -> Json<Vec<ChangeRequest>> {
    Json(state.records.list().to_vec())
}

async fn batch_approve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<BatchApproveRequest>,
) -> Result<Json<ApproveResponse>, AppError> {
    let receipt = decide(&state, &headers, BatchAction::Approve, &body.ids, body.approved_by).await?;

    Ok(Json(ApproveResponse {
        success: true,
        message: receipt.message(),
        approved_by: receipt.actor,
        approved_at: receipt.decided_at.to_rfc3339(),
    }))
}

async fn batch_reject(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<BatchRejectRequest>,
) -> Result<Json<RejectResponse>, AppError> {
    let receipt = decide(&state, &headers, BatchAction::Reject, &body.ids, body.rejected_by).await?;

    Ok(Json(RejectResponse {
        success: true,
        message: receipt.message(),
        rejected_by: receipt.actor,
        rejected_at: receipt.decided_at.to_rfc3339(),
    }))
}

/// Shared path of both batch endpoints: check the session (if any), pick
/// the actor, and acknowledge.
async fn decide(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    action: BatchAction,
    ids: &[serde_json::Value],
    named_actor: Option<String>,
) -> Result<BatchReceipt, AppError> {
    let identity = session_identity(state, headers).await?;

    if state.config.web.require_session {
        if let Some(ref identity) = identity {
            if !identity.role.can_decide() {
                warn!(
                    username = %identity.username,
                    role = %identity.role,
                    action = action.past_tense(),
                    "batch decision refused for role"
                );
                return Err(AppError::Forbidden(
                    "role is not allowed to approve or reject change requests".into(),
                ));
            }
        }
    }

    let named_actor = named_actor.filter(|name| !name.trim().is_empty());

    // With mandatory sessions the recorded actor is the session's owner,
    // whatever the body claims.
    let actor = match identity {
        Some(identity) if state.config.web.require_session => Some(identity.display_name),
        Some(identity) => named_actor.or(Some(identity.display_name)),
        None => named_actor,
    };
    Ok(state
        .records
        .acknowledge(action, &selection_from(ids), actor.as_deref()))
}

/// Sort batch entries into change-request ids and everything else. Ids may
/// arrive as JSON numbers or numeric strings.
fn selection_from(entries: &[serde_json::Value]) -> BatchSelection {
    let mut selection = BatchSelection::default();
    for entry in entries {
        let id = match entry {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        match id {
            Some(id) => selection.ids.push(id),
            None => selection.unrecognized += 1,
        }
    }
    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selection_from_mixed_entries() {
        let entries = vec![json!(1001), json!("1003"), json!("abc"), json!(null), json!(-4)];
        let selection = selection_from(&entries);
        assert_eq!(selection.ids, vec![1001, 1003]);
        assert_eq!(selection.unrecognized, 3);
        assert_eq!(selection.len(), entries.len());
    }
}
