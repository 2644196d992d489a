//! Public and role-protected endpoints.
//!
//! Authorization happens in middleware; handlers here only shape responses.
//! Protected handlers receive [`AuthenticatedClaims`] from request extensions.

use crate::auth::AuthenticatedClaims;
use crate::errors::BackendError;
use crate::routes::AppState;
use axum::{extract::State, Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Response for `/profile`.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileResponse {
    pub message: String,

    pub subject: String,

    /// Sorted.
    pub roles: Vec<String>,

    #[serde(rename = "issuedAt")]
    pub issued_at: Option<i64>,
}

/// Response for `/admin`.
#[derive(Debug, Clone, Serialize)]
pub struct AdminResponse {
    pub message: &'static str,

    #[serde(rename = "itemCountDB")]
    pub item_count_db: i64,
}

/// Handler for GET /public. No authentication.
pub async fn public() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "This is a public endpoint.",
    })
}

/// Handler for GET /profile. Any caller whose claims parse.
///
/// ```json
/// {"message": "Hello, alice", "subject": "...", "roles": ["user"], "issuedAt": 1700000000}
/// ```
#[instrument(skip_all, name = "backend.handlers.profile")]
pub async fn profile(Extension(claims): Extension<AuthenticatedClaims>) -> Json<ProfileResponse> {
    let message = format!("Hello, {}", claims.display_name());

    Json(ProfileResponse {
        message,
        subject: claims.subject,
        roles: claims.roles.into_iter().collect(),
        issued_at: claims.issued_at,
    })
}

/// Handler for GET /user. Requires role `user`.
pub async fn user() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Hello, user-level endpoint!",
    })
}

/// Handler for GET /admin. Requires role `admin`.
///
/// # Errors
///
/// 500 `{"error": "Database error"}` if the item count cannot be read.
#[instrument(skip_all, name = "backend.handlers.admin")]
pub async fn admin(State(state): State<Arc<AppState>>) -> Result<Json<AdminResponse>, BackendError> {
    let item_count_db = state.items.count_items().await?;

    tracing::debug!(target: "backend.handlers.admin", item_count_db, "Counted items");

    Ok(Json(AdminResponse {
        message: "Hello, admin-level endpoint!",
        item_count_db,
    }))
}
