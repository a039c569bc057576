//! Trigger runners: Kafka consumers that feed the core handlers.
//!
//! Offsets are committed only after the handler succeeds. On failure every
//! partition touched by the invocation is sought back to its first message, so
//! the same messages are consumed again after a back-off instead of being
//! swept past by a later commit.

use crate::batch_consumer::BatchConsumer;
use crate::config::KafkaConfig;
use crate::file_parser::{FileParser, TriggerResponse};
use crate::kafka_producer::base_client_config;
use crate::model::S3EventNotification;
use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Message, OwnedMessage};
use rdkafka::{Offset, TopicPartitionList};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

const SEEK_TIMEOUT: Duration = Duration::from_secs(10);

fn create_consumer(config: &KafkaConfig, group_suffix: &str, topic: &str) -> Result<StreamConsumer> {
    let group_id = format!("{}-{}", config.consumer_group, group_suffix);

    let consumer: StreamConsumer = base_client_config(config)
        .set("group.id", &group_id)
        .set("auto.offset.reset", &config.auto_offset_reset)
        .set("enable.auto.commit", "false")
        .set("session.timeout.ms", config.session_timeout_ms.to_string())
        .create()
        .context("Failed to create Kafka consumer")?;

    consumer
        .subscribe(&[topic])
        .with_context(|| format!("Failed to subscribe to {topic}"))?;

    info!(topic = %topic, group = %group_id, "Subscribed to Kafka topic");

    Ok(consumer)
}

/// Where a consumed message sits in its partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePosition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl MessagePosition {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }

    pub fn of<M: Message>(message: &M) -> Self {
        Self::new(message.topic(), message.partition(), message.offset())
    }
}

/// What to do with the consumer position once an invocation has settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Commit the next offset to read, one entry per partition
    Commit(Vec<MessagePosition>),
    /// Seek each partition back to the first message of the invocation
    Rewind(Vec<MessagePosition>),
}

/// Offsets to commit or rewind to for the messages of one invocation
pub fn settle(positions: &[MessagePosition], succeeded: bool) -> Settlement {
    let mut per_partition: BTreeMap<(&str, i32), i64> = BTreeMap::new();

    for position in positions {
        let key = (position.topic.as_str(), position.partition);
        if succeeded {
            let next = position.offset + 1;
            per_partition
                .entry(key)
                .and_modify(|o| *o = (*o).max(next))
                .or_insert(next);
        } else {
            per_partition
                .entry(key)
                .and_modify(|o| *o = (*o).min(position.offset))
                .or_insert(position.offset);
        }
    }

    let offsets = per_partition
        .into_iter()
        .map(|((topic, partition), offset)| MessagePosition::new(topic, partition, offset))
        .collect();

    if succeeded {
        Settlement::Commit(offsets)
    } else {
        Settlement::Rewind(offsets)
    }
}

/// Wait for the first item, then keep filling until `max_size` items or
/// `linger` has passed. `None` once the stream has ended.
pub async fn next_batch<S, T>(stream: &mut S, max_size: usize, linger: Duration) -> Option<Vec<T>>
where
    S: Stream<Item = T> + Unpin,
{
    let first = stream.next().await?;
    let mut batch = vec![first];

    let deadline = tokio::time::sleep(linger);
    tokio::pin!(deadline);

    while batch.len() < max_size.max(1) {
        tokio::select! {
            _ = &mut deadline => break,
            next = stream.next() => match next {
                Some(item) => batch.push(item),
                None => break,
            },
        }
    }

    Some(batch)
}

/// Apply a settlement to the consumer.
///
/// A rewind that cannot be performed is returned as an error; the runner
/// stops so that a restart or rebalance redelivers from the committed offset.
async fn apply_settlement(
    consumer: &StreamConsumer,
    settlement: Settlement,
    backoff: Duration,
) -> Result<()> {
    match settlement {
        Settlement::Commit(positions) => {
            let mut offsets = TopicPartitionList::new();
            for p in &positions {
                if let Err(e) =
                    offsets.add_partition_offset(&p.topic, p.partition, Offset::Offset(p.offset))
                {
                    warn!(error = %e, topic = %p.topic, partition = p.partition, "Failed to build commit offsets");
                    return Ok(());
                }
            }
            if let Err(e) = consumer.commit(&offsets, CommitMode::Async) {
                warn!(error = %e, "Failed to commit offsets");
            }
        }
        Settlement::Rewind(positions) => {
            for p in &positions {
                consumer
                    .seek(&p.topic, p.partition, Offset::Offset(p.offset), SEEK_TIMEOUT)
                    .with_context(|| {
                        format!("Failed to seek {}[{}] to {}", p.topic, p.partition, p.offset)
                    })?;
                info!(topic = %p.topic, partition = p.partition, offset = p.offset, "Rewound for redelivery");
            }
            metrics::counter!("import.kafka.rewinds").increment(1);
            tokio::time::sleep(backoff).await;
        }
    }
    Ok(())
}

/// Consumes bucket notifications and runs the file parser per message
pub struct IntakeEventRunner {
    consumer: StreamConsumer,
    parser: Arc<FileParser>,
    backoff: Duration,
}

impl IntakeEventRunner {
    pub fn new(config: &KafkaConfig, parser: Arc<FileParser>) -> Result<Self> {
        let consumer = create_consumer(config, "intake", &config.intake_events_topic)?;
        Ok(Self {
            consumer,
            parser,
            backoff: config.retry_backoff(),
        })
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        info!("Starting intake event consumer");

        let mut message_stream = self.consumer.stream();

        while let Some(message_result) = message_stream.next().await {
            let message = match message_result {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, "Kafka consumer error");
                    metrics::counter!("import.kafka.errors").increment(1);
                    continue;
                }
            };
            let position = MessagePosition::of(&message);

            let notification: S3EventNotification =
                match serde_json::from_slice(message.payload().unwrap_or_default()) {
                    Ok(notification) => notification,
                    Err(e) => {
                        // Nothing to retry; skip past it
                        warn!(
                            error = %e,
                            partition = position.partition,
                            offset = position.offset,
                            "Discarding undecodable bucket notification"
                        );
                        apply_settlement(&self.consumer, settle(&[position], true), self.backoff)
                            .await?;
                        continue;
                    }
                };

            let events = notification.into_events();
            let result = self.parser.handle(&events).await;
            let response = TriggerResponse::from_result(&result);

            match &result {
                Ok(report) => info!(
                    status = response.status_code,
                    files = report.files.len(),
                    rows_relayed = report.rows_relayed(),
                    "Intake invocation complete"
                ),
                Err(e) => error!(
                    status = response.status_code,
                    error = %e,
                    partition = position.partition,
                    offset = position.offset,
                    "Intake invocation failed; will retry"
                ),
            }

            apply_settlement(
                &self.consumer,
                settle(&[position], response.is_success()),
                self.backoff,
            )
            .await?;
        }

        Ok(())
    }
}

/// Gathers row messages into batches for the batch consumer
pub struct RowBatchRunner {
    consumer: StreamConsumer,
    batch_consumer: Arc<BatchConsumer>,
    batch_size: usize,
    linger: Duration,
    backoff: Duration,
}

impl RowBatchRunner {
    pub fn new(config: &KafkaConfig, batch_consumer: Arc<BatchConsumer>) -> Result<Self> {
        let consumer = create_consumer(config, "rows", &config.row_topic)?;
        Ok(Self {
            consumer,
            batch_consumer,
            batch_size: config.batch_size.max(1),
            linger: config.batch_linger(),
            backoff: config.retry_backoff(),
        })
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        info!(batch_size = self.batch_size, "Starting row batch consumer");

        let messages = self.consumer.stream().filter_map(|result| async move {
            match result {
                Ok(message) => Some(message.detach()),
                Err(e) => {
                    error!(error = %e, "Kafka consumer error");
                    metrics::counter!("import.kafka.errors").increment(1);
                    None
                }
            }
        });
        tokio::pin!(messages);

        while let Some(batch) = next_batch(&mut messages, self.batch_size, self.linger).await {
            let succeeded = self.process_batch(&batch).await;
            let positions: Vec<MessagePosition> = batch.iter().map(MessagePosition::of).collect();
            apply_settlement(&self.consumer, settle(&positions, succeeded), self.backoff).await?;
        }

        Ok(())
    }

    async fn process_batch(&self, batch: &[OwnedMessage]) -> bool {
        let bodies: Vec<&[u8]> = batch
            .iter()
            .map(|message| message.payload().unwrap_or_default())
            .collect();

        debug!(size = bodies.len(), "Dispatching row batch");

        match self.batch_consumer.handle(&bodies).await {
            Ok(report) => {
                debug!(processed = report.summary.processed_count, "Row batch complete");
                true
            }
            Err(e) => {
                error!(error = %e, size = batch.len(), "Row batch failed; rewinding for redelivery");
                false
            }
        }
    }
}
