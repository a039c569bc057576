//! Contracts against the external collaborators.
//!
//! Each trait is implemented once for production (S3, Kafka, PostgreSQL) and
//! once more by in-memory fakes in the tests. Instances are built in `main`
//! and shared behind `Arc`.

use crate::model::{CatalogProduct, Notification, ProductRecord, RawRow, StockRecord};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncRead;

/// Byte stream over a stored object
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// File storage addressed by (container, key)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a read stream; fails if the object is missing or unreadable
    async fn open_read(&self, container: &str, key: &str) -> Result<ObjectReader>;

    async fn copy(&self, container: &str, from_key: &str, to_key: &str) -> Result<()>;

    async fn delete(&self, container: &str, key: &str) -> Result<()>;

    /// Mint a time-limited URL allowing a single PUT of `key`
    async fn presign_put(
        &self,
        container: &str,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String>;
}

/// Durable at-least-once queue receiving parsed rows
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RowQueue: Send + Sync {
    /// Resolves once the broker has acknowledged the message
    async fn send(&self, row: &RawRow) -> Result<()>;
}

/// Publish-once fan-out for batch summaries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<()>;
}

/// Record store with upsert-by-primary-key semantics
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Create or overwrite the product and its stock row
    async fn upsert(&self, product: &ProductRecord, stock: &StockRecord) -> Result<()>;

    /// Every product with its stock count
    async fn list_products(&self) -> Result<Vec<CatalogProduct>>;

    async fn get_product(&self, id: &str) -> Result<Option<CatalogProduct>>;

    /// Connectivity check for readiness
    async fn ping(&self) -> Result<()>;
}
