//! Backend endpoint integration tests.
//!
//! Drives the real router with forwarded (unsigned) tokens, as the gateway
//! would deliver them after verification.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use backend_service::config::Config;
use backend_service::repositories::{InMemoryItemRepository, ItemRepository};
use backend_service::routes::{build_routes, AppState};
use backend_test_utils::{test_metrics_handle, TestClaimsBuilder};
use common::jwt::MAX_JWT_SIZE_BYTES;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

fn app_with(items: Arc<dyn ItemRepository>, roles_claim: Option<&str>) -> Router {
    let mut vars = HashMap::from([(
        "DATABASE_URL".to_string(),
        "postgresql://test/test".to_string(),
    )]);
    if let Some(claim) = roles_claim {
        vars.insert("ROLES_CLAIM".to_string(), claim.to_string());
    }
    let state = Arc::new(AppState {
        config: Config::from_vars(&vars).unwrap(),
        items,
    });
    build_routes(state, test_metrics_handle())
}

fn app() -> Router {
    app_with(Arc::new(InMemoryItemRepository::new()), None)
}

async fn get(app: Router, path: &str, token: Option<String>) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let response = app
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_public_needs_no_token() {
    let (status, body) = get(app(), "/public", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "This is a public endpoint."}));
}

#[tokio::test]
async fn test_public_ignores_garbage_token() {
    let (status, _) = get(app(), "/public", Some("garbage".to_string())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_user_role_reaches_user_endpoint() {
    let token = TestClaimsBuilder::new().with_roles(&["user"]).unsigned_token();

    let (status, body) = get(app(), "/user", Some(token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Hello, user-level endpoint!"}));
}

#[tokio::test]
async fn test_user_role_is_forbidden_on_admin() {
    let token = TestClaimsBuilder::new().with_roles(&["user"]).unsigned_token();

    let (status, body) = get(app(), "/admin", Some(token)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"error": "Missing role: admin"}));
}

#[tokio::test]
async fn test_admin_reports_item_count() {
    let token = TestClaimsBuilder::new()
        .subject("bob")
        .with_roles(&["admin"])
        .without_claim("iat")
        .unsigned_token();

    let (status, body) = get(app(), "/admin", Some(token.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"message": "Hello, admin-level endpoint!", "itemCountDB": 0})
    );

    let items = Arc::new(InMemoryItemRepository::with_items(7));
    let (_, body) = get(app_with(items, None), "/admin", Some(token)).await;
    assert_eq!(body["itemCountDB"], 7);
}

#[tokio::test]
async fn test_admin_storage_failure_is_generic_500() {
    let token = TestClaimsBuilder::new().with_roles(&["admin"]).unsigned_token();
    let items = Arc::new(InMemoryItemRepository::failing());

    let (status, body) = get(app_with(items, None), "/admin", Some(token)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Database error"}));
}

#[tokio::test]
async fn test_profile_returns_sorted_roles_and_username() {
    let token = TestClaimsBuilder::new()
        .subject("f81d4fae")
        .preferred_username("alice")
        .with_roles(&["user", "admin"])
        .issued_at(1_700_000_000)
        .unsigned_token();

    let (status, body) = get(app(), "/profile", Some(token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "message": "Hello, alice",
            "subject": "f81d4fae",
            "roles": ["admin", "user"],
            "issuedAt": 1_700_000_000
        })
    );
}

#[tokio::test]
async fn test_profile_without_iat_reports_null() {
    let token = TestClaimsBuilder::new()
        .subject("bob")
        .without_claim("iat")
        .unsigned_token();

    let (status, body) = get(app(), "/profile", Some(token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Hello, bob");
    assert_eq!(body["issuedAt"], Value::Null);
}

#[tokio::test]
async fn test_missing_roles_claim_is_malformed_even_on_profile() {
    let token = TestClaimsBuilder::new().without_claim("roles").unsigned_token();

    for path in ["/profile", "/user", "/admin"] {
        let (status, body) = get(app(), path, Some(token.clone())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{path}");
        assert_eq!(
            body,
            json!({"error": "Malformed token claims: missing 'roles' claim"}),
            "{path}"
        );
    }
}

#[tokio::test]
async fn test_protected_routes_without_token_are_unauthenticated() {
    for path in ["/profile", "/user", "/admin"] {
        let (status, body) = get(app(), path, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(body, json!({"error": "Missing bearer token"}));
    }
}

#[tokio::test]
async fn test_oversized_token_is_malformed() {
    let padding = "x".repeat(MAX_JWT_SIZE_BYTES + 1);
    let token = TestClaimsBuilder::new()
        .with_roles(&["user"])
        .with_claim("padding", json!(padding))
        .unsigned_token();

    let (status, body) = get(app(), "/user", Some(token)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Malformed token claims"));
}

#[tokio::test]
async fn test_keycloak_realm_roles() {
    let app = app_with(
        Arc::new(InMemoryItemRepository::new()),
        Some("realm_access.roles"),
    );
    let token = TestClaimsBuilder::new()
        .with_realm_roles(&["admin"])
        .unsigned_token();

    let (status, _) = get(app, "/admin", Some(token)).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let (status, _) = get(app(), "/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
