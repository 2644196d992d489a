//! Outbound HTTP client construction.

use std::time::Duration;

/// Build the client shared by discovery and the admin API.
///
/// Every request gets `timeout`; connection setup is capped at the same value.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("trust-provisioner/", env!("CARGO_PKG_VERSION")))
        .build()
}
