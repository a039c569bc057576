//! Catalog Import Service
//!
//! Bulk product import for the catalog. Clients ask for a short-lived signed
//! upload URL, drop a CSV file into the intake area of the bucket, and the
//! service turns every row into a product and stock entry.
//!
//! ## Stages
//!
//! - **Upload handles**: `GET /import?name=<file>` signs a `PUT` for
//!   `intake/<file>` in the intake container
//! - **File parsing**: object-created notifications trigger a streaming CSV
//!   parse; each row is relayed to the row topic, then the file is moved to
//!   `processed/`
//! - **Batch materialization**: row batches are validated, upserted into
//!   PostgreSQL and summarized in one notification tagged with a price
//!   category
//! - **Catalog API**: `GET /products`, `GET /products/{id}` and
//!   `POST /products` read and write the same tables
//!
//! ## Architecture
//!
//! ```text
//!   Client                 S3 Bucket                  Kafka
//! ┌──────────┐  signed   ┌──────────────┐  created  ┌──────────────┐
//! │ GET      │──PUT URL─▶│ intake/      │──────────▶│ intake       │
//! │ /import  │           │ processed/   │           │ events       │
//! └──────────┘           └──────────────┘           └──────────────┘
//!                               ▲                          │
//!                               │ copy + delete            ▼
//!                               │                   ┌──────────────┐
//!                               └───────────────────│ File         │
//!                                                   │ Parser       │
//!                                                   └──────────────┘
//!                                                          │ one message per row
//!                                                          ▼
//! ┌──────────────┐          ┌──────────────┐        ┌──────────────┐
//! │ Products     │◀─────────│ Batch        │◀───────│ catalog      │
//! │ Imported     │ summary  │ Consumer     │        │ items        │
//! └──────────────┘          └──────────────┘        └──────────────┘
//!                                  │
//!                                  ▼
//!                           ┌──────────────┐
//!                           │ PostgreSQL   │
//!                           │ products     │
//!                           │ stocks       │
//!                           └──────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod batch_consumer;
pub mod catalog_store;
pub mod config;
pub mod error;
pub mod file_parser;
pub mod kafka_consumer;
pub mod kafka_producer;
pub mod model;
pub mod ports;
pub mod s3_store;
pub mod upload_handle;

pub use api::AppState;
pub use auth::{AllowAll, AuthDecision, Authorizer, BasicAuthorizer};
pub use batch_consumer::{BatchConsumer, BatchReport, BatchSettings, PersistenceFailurePolicy};
pub use catalog_store::PgCatalogStore;
pub use config::Config;
pub use error::PipelineError;
pub use file_parser::{FileParser, FileReport, ParseReport, TriggerResponse};
pub use kafka_consumer::{IntakeEventRunner, RowBatchRunner};
pub use kafka_producer::{KafkaNotificationSink, KafkaPublisher, KafkaRowQueue};
pub use model::{
    BatchSummary, CatalogProduct, IntakeLayout, Notification, ObjectCreatedEvent, PriceCategory, ProductRecord,
    QueuedRecord, RawRow, StockRecord, UploadIntent,
};
pub use ports::{CatalogStore, NotificationSink, ObjectReader, ObjectStore, RowQueue};
pub use s3_store::S3ObjectStore;
pub use upload_handle::{UploadHandle, UploadHandleIssuer};
