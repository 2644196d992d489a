//! Environment Integration Test Suite
//!
//! Tests in this crate run against a live stack: the identity provider, the
//! API gateway (after `trust-provisioner` has configured it) and the backend
//! service. They exercise real tokens issued by the identity provider through
//! the real gateway.
//!
//! # Features
//!
//! - `smoke`: Stack health and token issuance (30s)
//! - `flows`: Provisioned gateway configuration and end-to-end authorization (1-2min)
//! - `all`: Enable all test categories
//!
//! # Prerequisites
//!
//! 1. Stack running (`docker compose up`), with the provisioner finished
//! 2. Ports reachable: IdP (8080), gateway proxy (8000), gateway admin (8001)
//! 3. Demo realm seeded with a `user`-role account and an `admin`-role account
//!    (override with `ENV_TEST_*` variables, see [`fixtures::idp_client::TestAccounts`])
//!
//! # Usage
//!
//! ```bash
//! # From repo root - runs 0 env-tests (no default features)
//! cargo test
//!
//! # Smoke tests only
//! cargo test -p env-tests --features smoke
//!
//! # Full suite
//! cargo test -p env-tests --features all
//! ```

pub mod cluster;
pub mod eventual;
pub mod fixtures;
