//! Items repository.
//!
//! The admin endpoint reports how many items exist. Postgres holds them in
//! production; the in-memory implementation backs tests and local runs.

use crate::errors::BackendError;
use crate::observability::metrics::record_db_query;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Instant;
use tracing::instrument;

/// Storage seam for items.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Total number of stored items.
    async fn count_items(&self) -> Result<i64, BackendError>;
}

/// Postgres-backed items repository.
#[derive(Clone)]
pub struct PgItemRepository {
    pool: PgPool,
}

impl PgItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert an item, returning its id.
    #[instrument(skip_all, name = "backend.repo.insert_item")]
    pub async fn insert_item(&self, name: &str) -> Result<i64, BackendError> {
        let start = Instant::now();
        let result = sqlx::query_scalar::<_, i64>("INSERT INTO items (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await;

        record_db_query("insert_item", status_label(&result), start.elapsed());
        Ok(result?)
    }
}

#[async_trait]
impl ItemRepository for PgItemRepository {
    #[instrument(skip_all, name = "backend.repo.count_items")]
    async fn count_items(&self) -> Result<i64, BackendError> {
        let start = Instant::now();
        let result = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await;

        record_db_query("count_items", status_label(&result), start.elapsed());
        Ok(result?)
    }
}

fn status_label<T>(result: &Result<T, sqlx::Error>) -> &'static str {
    if result.is_ok() {
        "success"
    } else {
        "error"
    }
}

/// In-memory items repository.
#[derive(Debug, Default)]
pub struct InMemoryItemRepository {
    count: AtomicI64,
    fail: AtomicBool,
}

impl InMemoryItemRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository already holding `count` items.
    pub fn with_items(count: i64) -> Self {
        Self {
            count: AtomicI64::new(count),
            fail: AtomicBool::new(false),
        }
    }

    /// Repository whose every query fails, as an unreachable database would.
    pub fn failing() -> Self {
        Self {
            count: AtomicI64::new(0),
            fail: AtomicBool::new(true),
        }
    }

    pub fn insert_item(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn count_items(&self) -> Result<i64, BackendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Database(
                "in-memory repository set to fail".to_string(),
            ));
        }
        Ok(self.count.load(Ordering::SeqCst))
    }
}
