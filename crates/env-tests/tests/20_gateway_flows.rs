//! P1 Flow Tests: Gateway Trust and Role Authorization
//!
//! Runs after `trust-provisioner` has configured the gateway. Covers the
//! provisioned configuration and the end-to-end flows a caller sees: public
//! access, signature enforcement at the gateway, and role checks at the
//! backend.

#![cfg(feature = "flows")]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use env_tests::cluster::ClusterConnection;
use env_tests::eventual::{assert_eventually, ConsistencyCategory};
use env_tests::fixtures::{GatewayClient, IdpClient, TestAccounts};
use serde_json::Value;
use serial_test::serial;

/// Consumer the provisioner binds the IdP's key to.
const CONSUMER: &str = "identity-provider";

const PROTECTED_ROUTES: [&str; 3] = ["profile-route", "user-route", "admin-route"];

struct Env {
    gateway: GatewayClient,
    idp: IdpClient,
    accounts: TestAccounts,
}

/// Connects and waits until every protected route is enforced.
async fn provisioned() -> Env {
    let cluster = ClusterConnection::new()
        .await
        .expect("Failed to connect to stack - ensure 'docker compose up' is running");
    let env = Env {
        gateway: GatewayClient::new(&cluster.gateway_url, &cluster.gateway_admin_url),
        idp: IdpClient::new(cluster.issuer_url()),
        accounts: TestAccounts::from_env(),
    };

    let gateway = &env.gateway;
    assert_eventually(ConsistencyCategory::Provisioning, || async move {
        for route in PROTECTED_ROUTES {
            match gateway.route_plugins(route).await {
                Ok(plugins) if plugins.iter().any(|p| p.name == "jwt") => {}
                _ => return false,
            }
        }
        true
    })
    .await
    .expect("Provisioner should enforce all protected routes");

    env
}

fn payload(token: &str) -> Value {
    let segment = token.split('.').nth(1).expect("payload segment");
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).expect("base64url")).expect("JSON")
}

async fn token_for(env: &Env, admin: bool) -> String {
    let grant = if admin {
        env.accounts.admin_grant()
    } else {
        env.accounts.user_grant()
    };
    env.idp
        .password_grant(&grant)
        .await
        .expect("Password grant should succeed")
        .access_token
}

#[tokio::test]
#[serial]
async fn test_routes_provisioned_with_expected_paths() {
    let env = provisioned().await;

    for (name, path) in [
        ("public-route", "/public"),
        ("profile-route", "/profile"),
        ("user-route", "/user"),
        ("admin-route", "/admin"),
    ] {
        let route = env
            .gateway
            .route(name)
            .await
            .unwrap()
            .unwrap_or_else(|| unreachable!("route {name} should exist"));
        assert_eq!(route.paths, vec![path.to_string()]);
    }

    let public_plugins = env.gateway.route_plugins("public-route").await.unwrap();
    assert!(
        public_plugins.iter().all(|p| p.name != "jwt"),
        "Public route must not verify signatures"
    );
}

#[tokio::test]
#[serial]
async fn test_single_credential_matches_token_issuer() {
    let env = provisioned().await;
    let token = token_for(&env, false).await;
    let claims = payload(&token);

    let credentials = env.gateway.jwt_credentials(CONSUMER).await.unwrap();
    assert_eq!(credentials.len(), 1, "Exactly one credential per consumer");

    let credential = &credentials[0];
    assert_eq!(credential.algorithm, "RS256");
    assert!(credential
        .rsa_public_key
        .as_deref()
        .is_some_and(|pem| pem.starts_with("-----BEGIN PUBLIC KEY-----")));

    let plugin = env
        .gateway
        .route_plugins("admin-route")
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.name == "jwt")
        .unwrap();
    let claim_name = plugin.config["key_claim_name"].as_str().unwrap_or("iss");

    let join_value = if claim_name == "kid" {
        let header = jsonwebtoken::decode_header(&token).unwrap();
        Value::from(header.kid)
    } else {
        claims[claim_name].clone()
    };
    assert_eq!(Value::from(credential.key.clone()), join_value);
}

#[tokio::test]
#[serial]
async fn test_protected_routes_reject_missing_token() {
    let env = provisioned().await;

    for path in ["/profile", "/user", "/admin"] {
        let response = env.gateway.get(path, None).await.unwrap();
        assert_eq!(response.status(), 401, "{path} should require a token");
    }
}

#[tokio::test]
#[serial]
async fn test_tampered_signature_rejected_at_gateway() {
    let env = provisioned().await;
    let token = token_for(&env, true).await;

    let (signed, signature) = token.rsplit_once('.').unwrap();
    let flipped = if signature.starts_with('A') { "B" } else { "A" };
    let tampered = format!("{}.{}{}", signed, flipped, &signature[1..]);

    let response = env.gateway.get("/admin", Some(&tampered)).await.unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[serial]
async fn test_user_role_flow() {
    let env = provisioned().await;
    let token = token_for(&env, false).await;

    let response = env.gateway.get("/user", Some(&token)).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Hello, user-level endpoint!");

    let response = env.gateway.get("/admin", Some(&token)).await.unwrap();
    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Missing role: admin");
}

#[tokio::test]
#[serial]
async fn test_admin_role_flow_counts_items() {
    let env = provisioned().await;
    let token = token_for(&env, true).await;

    let response = env.gateway.get("/admin", Some(&token)).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Hello, admin-level endpoint!");
    assert!(
        body["itemCountDB"].as_u64().is_some(),
        "itemCountDB should be a non-negative integer, got {}",
        body["itemCountDB"]
    );
}

#[tokio::test]
#[serial]
async fn test_profile_echoes_identity() {
    let env = provisioned().await;
    let token = token_for(&env, false).await;
    let claims = payload(&token);

    let response = env.gateway.get("/profile", Some(&token)).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    let expected_name = claims["preferred_username"]
        .as_str()
        .or_else(|| claims["sub"].as_str())
        .unwrap();
    assert_eq!(body["message"], format!("Hello, {}", expected_name));
    assert_eq!(body["subject"], claims["sub"]);
    assert!(body["roles"]
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r == "user"));

    if let Some(iat) = claims["iat"].as_i64() {
        assert_eq!(body["issuedAt"], iat);
        let now = chrono::Utc::now().timestamp();
        assert!((now - iat).abs() < 300, "iat should be recent");
    }
}
