//! Test fixtures for interacting with stack services.

pub mod gateway_client;
pub mod idp_client;

pub use gateway_client::GatewayClient;
pub use idp_client::{IdpClient, TestAccounts};
