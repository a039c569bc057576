use crate::batch_consumer::{BatchSettings, PersistenceFailurePolicy};
use crate::model::IntakeLayout;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration for the catalog import service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Object storage configuration
    #[serde(default)]
    pub s3: S3Config,
    /// Kafka configuration
    pub kafka: KafkaConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Parsing and aggregation settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// API configuration for the upload-handle endpoint
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Bucket receiving uploads (`INTAKE_CONTAINER`)
    pub intake_container: Option<String>,
    #[serde(default = "default_intake_prefix")]
    pub intake_prefix: String,
    #[serde(default = "default_processed_prefix")]
    pub processed_prefix: String,
    /// Upload handle lifetime (`SIGNED_URL_TTL_SECONDS`)
    #[serde(default = "default_signed_url_ttl_secs")]
    pub signed_url_ttl_secs: u64,
}

/// Kafka configuration shared by producers and consumers
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// Topic carrying object-created notifications from the bucket
    #[serde(default = "default_intake_events_topic")]
    pub intake_events_topic: String,
    /// Topic rows are relayed to (`QUEUE_ENDPOINT`)
    #[serde(default = "default_row_topic")]
    pub row_topic: String,
    /// Topic batch summaries are published to (`NOTIFICATION_TOPIC`)
    #[serde(default = "default_notification_topic")]
    pub notification_topic: String,
    /// security.protocol (plaintext, ssl, sasl_plaintext, sasl_ssl)
    pub security_protocol: Option<String>,
    pub ssl_ca_location: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,
    /// Delivery timeout for produced messages
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    /// Maximum rows handed to one batch consumer invocation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum wait for a batch to fill up
    #[serde(default = "default_batch_linger_ms")]
    pub batch_linger_ms: u64,
    /// Pause before re-consuming after a failed invocation
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Parsing and aggregation settings
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Batches whose cheapest product is below this are tagged `low`
    /// (`PRICE_CATEGORY_THRESHOLD`)
    #[serde(default = "default_price_category_threshold")]
    pub price_category_threshold: f64,
    /// Maximum row sends in flight per intake file
    #[serde(default = "default_relay_concurrency")]
    pub relay_concurrency: usize,
    #[serde(default)]
    pub persistence_failure_policy: PersistenceFailurePolicy,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Basic auth logins for `/import` (empty = no check)
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

// Default value functions
fn default_service_name() -> String {
    "catalog-import".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_intake_prefix() -> String {
    "intake".to_string()
}

fn default_processed_prefix() -> String {
    "processed".to_string()
}

fn default_signed_url_ttl_secs() -> u64 {
    60
}

fn default_consumer_group() -> String {
    "catalog-import".to_string()
}

fn default_intake_events_topic() -> String {
    "catalog.intake.events".to_string()
}

fn default_row_topic() -> String {
    "catalog.items".to_string()
}

fn default_notification_topic() -> String {
    "catalog.products.imported".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_session_timeout_ms() -> u32 {
    30000
}

fn default_message_timeout_ms() -> u64 {
    5000
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_linger_ms() -> u64 {
    1000
}

fn default_retry_backoff_ms() -> u64 {
    5000
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_price_category_threshold() -> f64 {
    20.0
}

fn default_relay_concurrency() -> usize {
    16
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

/// Flat environment variables that override the layered configuration
const NAMED_OVERRIDES: &[(&str, &str)] = &[
    ("INTAKE_CONTAINER", "s3.intake_container"),
    ("QUEUE_ENDPOINT", "kafka.row_topic"),
    ("NOTIFICATION_TOPIC", "kafka.notification_topic"),
    ("PRICE_CATEGORY_THRESHOLD", "pipeline.price_category_threshold"),
    ("SIGNED_URL_TTL_SECONDS", "s3.signed_url_ttl_secs"),
];

impl Config {
    /// Load configuration from config files and the environment
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/catalog-import").required(false))
            .add_source(config::File::with_name("/etc/catalog-import/config").required(false))
            // IMPORT__KAFKA__BOOTSTRAP_SERVERS -> kafka.bootstrap_servers
            .add_source(
                config::Environment::with_prefix("IMPORT")
                    .separator("__")
                    .try_parsing(true),
            );

        for (variable, key) in NAMED_OVERRIDES {
            builder = builder.set_override_option(*key, std::env::var(variable).ok())?;
        }

        Self::from_builder(builder)
    }

    /// Build and validate from an assembled source stack
    pub fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> anyhow::Result<Self> {
        let config: Self = builder
            .build()?
            .try_deserialize()
            .context("Invalid catalog-import configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.pipeline.price_category_threshold.is_finite() {
            bail!("pipeline.price_category_threshold must be a finite number");
        }
        if self.pipeline.relay_concurrency == 0 {
            bail!("pipeline.relay_concurrency must be greater than zero");
        }
        if self.kafka.batch_size == 0 {
            bail!("kafka.batch_size must be greater than zero");
        }
        if self.s3.signed_url_ttl_secs == 0 {
            bail!("s3.signed_url_ttl_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.s3.signed_url_ttl_secs)
    }

    pub fn intake_layout(&self) -> IntakeLayout {
        IntakeLayout::new(&self.s3.intake_prefix, &self.s3.processed_prefix)
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            price_threshold: self.pipeline.price_category_threshold,
            failure_policy: self.pipeline.persistence_failure_policy,
        }
    }
}

impl KafkaConfig {
    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    pub fn batch_linger(&self) -> Duration {
        Duration::from_millis(self.batch_linger_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            intake_container: None,
            intake_prefix: default_intake_prefix(),
            processed_prefix: default_processed_prefix(),
            signed_url_ttl_secs: default_signed_url_ttl_secs(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            price_category_threshold: default_price_category_threshold(),
            relay_concurrency: default_relay_concurrency(),
            persistence_failure_policy: PersistenceFailurePolicy::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            credentials: HashMap::new(),
        }
    }
}
