//! Authorization middleware for protected routes.
//!
//! Two layers, applied in order:
//! - `parse_claims` - on every protected route; reads the forwarded bearer
//!   token's claims (no signature check) into request extensions
//! - `require_role` - per route; checks the parsed role set
//!
//! A request moves Unauthenticated -> ClaimsParsed -> Authorized | Forbidden.
//! Public routes carry neither layer.

use crate::auth::{trust_upstream_claims, AuthenticatedClaims, RolesClaim};
use crate::errors::BackendError;
use crate::observability::metrics::{record_authz_decision, AuthzOutcome};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

/// State for `parse_claims`.
#[derive(Clone)]
pub struct AuthState {
    pub roles_claim: RolesClaim,
}

/// Role an endpoint requires, as state for `require_role`.
#[derive(Debug, Clone, Copy)]
pub struct RequiredRole(pub &'static str);

fn extract_bearer_token(req: &Request) -> Result<&str, BackendError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "backend.middleware.auth", "Missing Authorization header");
            BackendError::Unauthenticated
        })?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            tracing::debug!(target: "backend.middleware.auth", "Invalid Authorization header format");
            BackendError::Unauthenticated
        })
}

/// Parse forwarded claims into request extensions.
///
/// Only mounted on routes the gateway verifies, which is what makes the
/// unverified parse sound.
///
/// # Response
///
/// - 401 if no bearer token is present (gateway bypassed)
/// - 500 if the claims are malformed, including a missing roles claim
#[instrument(skip_all, name = "backend.middleware.parse_claims")]
pub async fn parse_claims(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, BackendError> {
    let token = extract_bearer_token(&req).inspect_err(|_| {
        record_authz_decision(AuthzOutcome::Unauthenticated);
    })?;

    let claims = trust_upstream_claims(token, &state.roles_claim).map_err(|e| {
        record_authz_decision(AuthzOutcome::MalformedClaims);
        BackendError::MalformedClaims(e.to_string())
    })?;

    tracing::debug!(
        target: "backend.middleware.auth",
        roles = ?claims.roles,
        "Forwarded claims parsed"
    );

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Enforce `required` against the parsed role set.
///
/// # Response
///
/// - 403 `Missing role: <role>` if the role is absent
/// - 500 if `parse_claims` did not run first
#[instrument(skip_all, name = "backend.middleware.require_role", fields(role = required.0))]
pub async fn require_role(
    State(required): State<RequiredRole>,
    req: Request,
    next: Next,
) -> Result<Response, BackendError> {
    let Some(claims) = req.extensions().get::<AuthenticatedClaims>() else {
        tracing::error!(target: "backend.middleware.auth", "require_role mounted without parse_claims");
        return Err(BackendError::Internal);
    };

    if !claims.has_role(required.0) {
        record_authz_decision(AuthzOutcome::Forbidden);
        tracing::info!(target: "backend.middleware.auth", role = required.0, "Required role missing");
        return Err(BackendError::MissingRole(required.0.to_string()));
    }

    record_authz_decision(AuthzOutcome::Authorized);
    Ok(next.run(req).await)
}
