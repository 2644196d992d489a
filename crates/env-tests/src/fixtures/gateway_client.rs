//! Gateway client fixture.
//!
//! Reads the provisioned configuration from the admin API and sends requests
//! through the proxy, with or without a bearer token.

use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Gateway client errors.
#[derive(Debug, Error)]
pub enum GatewayClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Admin API {path} returned status {status}: {body}")]
    AdminFailed {
        path: String,
        status: u16,
        body: String,
    },
}

/// Admin list responses are paged as `{"data": [...], "next": ...}`.
#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteInfo {
    pub name: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtCredentialInfo {
    pub key: String,
    pub algorithm: String,
    pub rsa_public_key: Option<String>,
}

pub struct GatewayClient {
    proxy_url: String,
    admin_url: String,
    http_client: Client,
}

impl GatewayClient {
    pub fn new(proxy_url: impl Into<String>, admin_url: impl Into<String>) -> Self {
        Self {
            proxy_url: proxy_url.into(),
            admin_url: admin_url.into(),
            http_client: Client::new(),
        }
    }

    /// `GET` through the proxy. The response is returned whatever its status.
    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<Response, GatewayClientError> {
        let mut request = self.http_client.get(format!("{}{}", self.proxy_url, path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    pub async fn route(&self, name: &str) -> Result<Option<RouteInfo>, GatewayClientError> {
        self.admin_get_optional(&format!("/routes/{}", name)).await
    }

    pub async fn route_plugins(&self, route: &str) -> Result<Vec<PluginInfo>, GatewayClientError> {
        Ok(self
            .admin_get_optional::<Page<PluginInfo>>(&format!("/routes/{}/plugins", route))
            .await?
            .map(|page| page.data)
            .unwrap_or_default())
    }

    pub async fn jwt_credentials(
        &self,
        consumer: &str,
    ) -> Result<Vec<JwtCredentialInfo>, GatewayClientError> {
        Ok(self
            .admin_get_optional::<Page<JwtCredentialInfo>>(&format!("/consumers/{}/jwt", consumer))
            .await?
            .map(|page| page.data)
            .unwrap_or_default())
    }

    /// 404 is `None`; other non-success statuses are errors.
    async fn admin_get_optional<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<Option<T>, GatewayClientError> {
        let response = self
            .http_client
            .get(format!("{}{}", self.admin_url, path))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayClientError::AdminFailed {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(Some(response.json::<T>().await?))
    }
}
