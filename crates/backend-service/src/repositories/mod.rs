//! Repository layer for the backend service.
//!
//! Handlers reach storage only through [`ItemRepository`], so tests can run
//! the full router against [`InMemoryItemRepository`].

pub mod items;

pub use items::{InMemoryItemRepository, ItemRepository, PgItemRepository};
