use anyhow::{bail, Context, Result};
use catalog_import::api::{start_api_server, AppState};
use catalog_import::{
    AllowAll, Authorizer, BasicAuthorizer, BatchConsumer, Config, FileParser, IntakeEventRunner, KafkaNotificationSink, KafkaPublisher,
    KafkaRowQueue, PgCatalogStore, RowBatchRunner, S3ObjectStore, UploadHandleIssuer,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.service.log_level);

    info!(service = %config.service.name, "Starting catalog import service");

    init_metrics(config.service.metrics_port)?;

    let catalog = Arc::new(
        PgCatalogStore::new(&config.database)
            .await
            .context("Failed to initialize catalog store")?,
    );

    if config.database.run_migrations {
        catalog
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let object_store = Arc::new(
        S3ObjectStore::new(&config.s3)
            .await
            .context("Failed to initialize object store")?,
    );

    if config.s3.intake_container.is_none() {
        warn!("INTAKE_CONTAINER is not set; upload handle requests will fail");
    }

    let publisher =
        Arc::new(KafkaPublisher::new(&config.kafka).context("Failed to initialize Kafka producer")?);
    let row_queue = Arc::new(KafkaRowQueue::new(
        publisher.clone(),
        &config.kafka.row_topic,
    ));
    let notification_sink = Arc::new(KafkaNotificationSink::new(
        publisher.clone(),
        &config.kafka.notification_topic,
    ));

    let issuer = Arc::new(UploadHandleIssuer::new(
        object_store.clone(),
        config.s3.intake_container.clone(),
        config.intake_layout(),
        config.signed_url_ttl(),
    ));

    let parser = Arc::new(FileParser::new(
        object_store.clone(),
        row_queue,
        config.intake_layout(),
        config.pipeline.relay_concurrency,
    ));

    let batch_consumer = Arc::new(BatchConsumer::new(
        catalog.clone(),
        notification_sink,
        config.batch_settings(),
    ));

    let intake_runner = IntakeEventRunner::new(&config.kafka, parser)
        .context("Failed to initialize intake event consumer")?;
    let row_runner = RowBatchRunner::new(&config.kafka, batch_consumer)
        .context("Failed to initialize row batch consumer")?;

    let authorizer: Arc<dyn Authorizer> = if config.api.credentials.is_empty() {
        warn!("No API credentials configured; /import accepts anonymous requests");
        Arc::new(AllowAll)
    } else {
        Arc::new(BasicAuthorizer::new(config.api.credentials.clone()))
    };

    let api_state = AppState {
        issuer,
        catalog: catalog.clone(),
        authorizer,
    };

    let mut intake_handle = tokio::spawn(async move {
        if let Err(e) = intake_runner.run().await {
            error!(error = %e, "Intake event consumer error");
        }
    });

    let mut row_handle = tokio::spawn(async move {
        if let Err(e) = row_runner.run().await {
            error!(error = %e, "Row batch consumer error");
        }
    });

    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Catalog import service started successfully");

    // A stopped runner leaves its partitions unconsumed; exit so the
    // supervisor restarts from the committed offsets.
    let runner_stopped = tokio::select! {
        _ = shutdown_signal() => None,
        _ = &mut intake_handle => Some("intake event consumer"),
        _ = &mut row_handle => Some("row batch consumer"),
    };

    info!("Shutting down catalog import service");

    intake_handle.abort();
    row_handle.abort();
    api_handle.abort();

    if let Some(runner) = runner_stopped {
        bail!("{runner} stopped unexpectedly");
    }

    info!("Catalog import service stopped");

    Ok(())
}

fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
