//! HTTP client for the gateway administrative API.

use super::{AdminCallError, AdminPath, DeleteOutcome, GatewayAdmin};
use common::secret::{ExposeSecret, SecretString};
use reqwest::{Client, Response, StatusCode, Url};
use tracing::instrument;

/// Header carrying the admin API token, when the gateway requires one.
pub const ADMIN_TOKEN_HEADER: &str = "Kong-Admin-Token";

/// Longest response body kept in an error. Admin API errors are small JSON
/// documents; anything bigger is truncated.
const MAX_ERROR_BODY_CHARS: usize = 2048;

/// reqwest-backed [`GatewayAdmin`].
#[derive(Clone)]
pub struct AdminClient {
    client: Client,
    base_url: Url,
    admin_token: Option<SecretString>,
}

impl AdminClient {
    /// `client` should carry a request timeout; see
    /// [`crate::http::build_http_client`].
    pub fn new(client: Client, base_url: Url, admin_token: Option<SecretString>) -> Self {
        Self {
            client,
            base_url,
            admin_token,
        }
    }

    fn url(&self, path: &AdminPath) -> Result<Url, AdminCallError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                AdminCallError::Transport(format!(
                    "admin URL '{}' cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(path.segments());
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.admin_token {
            Some(token) => builder.header(ADMIN_TOKEN_HEADER, token.expose_secret()),
            None => builder,
        }
    }
}

fn transport(e: &reqwest::Error) -> AdminCallError {
    let kind = if e.is_timeout() {
        "timed out"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    AdminCallError::Transport(format!("{kind}: {e}"))
}

async fn status_error(response: Response) -> AdminCallError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
    AdminCallError::Status {
        status,
        body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}

#[async_trait::async_trait]
impl GatewayAdmin for AdminClient {
    #[instrument(skip_all, name = "provisioner.gateway.ready")]
    async fn ready(&self) -> Result<(), AdminCallError> {
        let url = self.url(&AdminPath::status())?;
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    #[instrument(skip_all, name = "provisioner.gateway.delete", fields(path = %path))]
    async fn delete(&self, path: &AdminPath) -> Result<DeleteOutcome, AdminCallError> {
        let url = self.url(path)?;
        let response = self
            .request(reqwest::Method::DELETE, url)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(target: "provisioner.gateway", path = %path, "Nothing to delete");
            return Ok(DeleteOutcome::NotFound);
        }
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        tracing::debug!(target: "provisioner.gateway", path = %path, status = %status, "Deleted");
        Ok(DeleteOutcome::Deleted)
    }

    #[instrument(skip_all, name = "provisioner.gateway.create", fields(path = %path))]
    async fn create(
        &self,
        path: &AdminPath,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, AdminCallError> {
        let url = self.url(path)?;
        let response = self
            .request(reqwest::Method::POST, url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        let text = response.text().await.map_err(|e| transport(&e))?;
        tracing::debug!(target: "provisioner.gateway", path = %path, status = %status, "Created");

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            AdminCallError::Transport(format!("created object is not valid JSON: {e}"))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, token: Option<&str>) -> AdminClient {
        AdminClient::new(
            crate::http::build_http_client(Duration::from_secs(5)).unwrap(),
            Url::parse(&server.uri()).unwrap(),
            token.map(|t| SecretString::from(t.to_string())),
        )
    }

    #[tokio::test]
    async fn test_ready_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"database": {"reachable": true}})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server, None).ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_ready_not_ok_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(503).set_body_string("booting"))
            .mount(&server)
            .await;

        let err = client_for(&server, None).ready().await.unwrap_err();
        assert_eq!(
            err,
            AdminCallError::Status {
                status: 503,
                body: "booting".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_delete_tolerates_404() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/routes/admin-route"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not found"})))
            .mount(&server)
            .await;

        let outcome = client_for(&server, None)
            .delete(&AdminPath::route("admin-route"))
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_delete_204() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/services/backend-service"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let outcome = client_for(&server, None)
            .delete(&AdminPath::service("backend-service"))
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_delete_other_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/services/backend-service"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"message":"service has routes"}"#),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .delete(&AdminPath::service("backend-service"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdminCallError::Status { status: 400, body } if body.contains("has routes")));
    }

    #[tokio::test]
    async fn test_issuer_credential_key_is_percent_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(
                "/consumers/identity-provider/jwt/http:%2F%2Flocalhost:8080%2Frealms%2Fdemo-realm",
            ))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server, None)
            .delete(&AdminPath::consumer_jwt_credential(
                "identity-provider",
                "http://localhost:8080/realms/demo-realm",
            ))
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_create_posts_json_and_sends_admin_token() {
        let server = MockServer::start().await;
        let body = json!({"name": "backend-service", "url": "http://backend:3000"});
        Mock::given(method("POST"))
            .and(path("/services"))
            .and(header(ADMIN_TOKEN_HEADER, "admin-secret"))
            .and(body_json(&body))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "svc-1", "name": "backend-service"})))
            .expect(1)
            .mount(&server)
            .await;

        let created = client_for(&server, Some("admin-secret"))
            .create(&AdminPath::services(), &body)
            .await
            .unwrap();
        assert_eq!(created["id"], "svc-1");
    }

    #[tokio::test]
    async fn test_create_conflict_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/consumers"))
            .respond_with(
                ResponseTemplate::new(409)
                    .set_body_string(r#"{"message":"UNIQUE violation detected on '{username=\"identity-provider\"}'"}"#),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .create(&AdminPath::consumers(), &json!({"username": "identity-provider"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AdminCallError::Status { status: 409, body } if body.contains("UNIQUE violation")));
    }

    #[tokio::test]
    async fn test_base_url_with_path_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin-api/status"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = AdminClient::new(
            crate::http::build_http_client(Duration::from_secs(5)).unwrap(),
            Url::parse(&format!("{}/admin-api", server.uri())).unwrap(),
            None,
        );
        client.ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transport_error() {
        // Bind then drop to get a port nothing is listening on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = AdminClient::new(
            crate::http::build_http_client(Duration::from_secs(2)).unwrap(),
            Url::parse(&format!("http://{addr}")).unwrap(),
            None,
        );

        let err = client.ready().await.unwrap_err();
        assert!(matches!(err, AdminCallError::Transport(msg) if msg.starts_with("connection failed")));
    }
}
