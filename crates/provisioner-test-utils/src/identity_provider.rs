//! Identity provider double
//!
//! A wiremock server laid out like a Keycloak realm: the issuer is
//! `<server>/realms/test-realm` and the key set lives at the realm's
//! `protocol/openid-connect/certs` path.

use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Realm name used in the issuer URL.
pub const TEST_REALM: &str = "test-realm";

const CERTS_PATH: &str = "/realms/test-realm/protocol/openid-connect/certs";

pub struct FakeIdentityProvider {
    server: MockServer,
}

impl FakeIdentityProvider {
    /// Serve `key_set` from the first request on.
    pub async fn serving(key_set: Value) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CERTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(key_set))
            .mount(&server)
            .await;
        Self { server }
    }

    /// Fail the first `failures` key-set requests with 503, then serve `key_set`.
    pub async fn serving_after(failures: u64, key_set: Value) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CERTS_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("Keycloak is starting"))
            .up_to_n_times(failures)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CERTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(key_set))
            .with_priority(2)
            .mount(&server)
            .await;
        Self { server }
    }

    /// Answer every key-set request with `status`.
    pub async fn failing(status: u16) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CERTS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn issuer_url(&self) -> String {
        format!("{}/realms/{TEST_REALM}", self.server.uri())
    }

    pub fn jwks_url(&self) -> String {
        format!("{}{CERTS_PATH}", self.server.uri())
    }

    /// Number of key-set requests received so far.
    pub async fn jwks_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.iter().filter(|r| r.url.path() == CERTS_PATH).count())
            .unwrap_or_default()
    }
}
