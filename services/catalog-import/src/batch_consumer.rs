//! Batch consumer and aggregator.
//!
//! Each message in a delivered batch is decoded, validated and upserted on its
//! own; one bad record never blocks its siblings. Records sharing an id are
//! written one after another in delivery order. After the whole batch has
//! settled, exactly one notification summarising the persisted records is
//! published.

use crate::error::{describe, PipelineError};
use crate::model::{BatchSummary, QueuedRecord};
use crate::ports::{CatalogStore, NotificationSink};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// What to do when the store rejects a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceFailurePolicy {
    /// Log, count as not processed, keep going
    #[default]
    Skip,
    /// Fail the invocation so the queue redelivers the whole batch
    FailBatch,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub price_threshold: f64,
    pub failure_policy: PersistenceFailurePolicy,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            price_threshold: 20.0,
            failure_policy: PersistenceFailurePolicy::Skip,
        }
    }
}

/// Outcome of one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub received: usize,
    pub skipped: usize,
    pub summary: BatchSummary,
    pub notified: bool,
}

enum RecordOutcome {
    Persisted(QueuedRecord),
    Skipped(PipelineError),
}

pub struct BatchConsumer {
    store: Arc<dyn CatalogStore>,
    sink: Arc<dyn NotificationSink>,
    settings: BatchSettings,
}

impl BatchConsumer {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        sink: Arc<dyn NotificationSink>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            store,
            sink,
            settings,
        }
    }

    /// Handle one delivered batch of message bodies.
    ///
    /// Succeeds regardless of how many records were skipped. The only failure
    /// is a persistence error under [`PersistenceFailurePolicy::FailBatch`].
    #[instrument(skip(self, bodies), fields(batch_size = bodies.len()))]
    pub async fn handle<B>(&self, bodies: &[B]) -> Result<BatchReport, PipelineError>
    where
        B: AsRef<[u8]> + Sync,
    {
        let started = Instant::now();

        let mut outcomes: Vec<Option<RecordOutcome>> = Vec::with_capacity(bodies.len());
        let mut chains: Vec<Vec<(usize, QueuedRecord)>> = Vec::new();
        let mut chain_by_id: HashMap<String, usize> = HashMap::new();

        for (index, body) in bodies.iter().enumerate() {
            match prepare_record(body.as_ref()) {
                Ok(record) => {
                    let id = record.id.clone().unwrap_or_default();
                    let chain = *chain_by_id.entry(id).or_insert_with(|| {
                        chains.push(Vec::new());
                        chains.len() - 1
                    });
                    chains[chain].push((index, record));
                    outcomes.push(None);
                }
                Err(e) => {
                    warn!(index, error = %e, code = e.code(), "Skipping record");
                    outcomes.push(Some(RecordOutcome::Skipped(e)));
                }
            }
        }

        // Distinct ids are written concurrently; repeats of one id are
        // written in delivery order so the last one wins.
        let settled = join_all(chains.into_iter().map(|chain| self.persist_chain(chain))).await;
        for (index, outcome) in settled.into_iter().flatten() {
            outcomes[index] = Some(outcome);
        }

        let mut items = Vec::with_capacity(outcomes.len());
        let mut skipped = 0usize;

        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                RecordOutcome::Persisted(record) => items.push(record),
                RecordOutcome::Skipped(e) => {
                    if matches!(e, PipelineError::Persistence { .. })
                        && self.settings.failure_policy == PersistenceFailurePolicy::FailBatch
                    {
                        error!(error = %e, "Persistence failed; failing batch for redelivery");
                        metrics::counter!("import.batches.failed").increment(1);
                        return Err(e);
                    }
                    skipped += 1;
                }
            }
        }

        let summary = BatchSummary::from_items(items, self.settings.price_threshold);
        let notified = self.publish(&summary).await;

        metrics::counter!("import.records.persisted").increment(summary.processed_count as u64);
        metrics::counter!("import.records.skipped").increment(skipped as u64);
        metrics::histogram!("import.batch.duration_seconds").record(started.elapsed().as_secs_f64());

        info!(
            received = bodies.len(),
            processed = summary.processed_count,
            skipped = skipped,
            price_category = %summary.price_category,
            notified = notified,
            "Batch processed"
        );

        Ok(BatchReport {
            received: bodies.len(),
            skipped,
            summary,
            notified,
        })
    }

    async fn persist_chain(
        &self,
        chain: Vec<(usize, QueuedRecord)>,
    ) -> Vec<(usize, RecordOutcome)> {
        let mut settled = Vec::with_capacity(chain.len());
        for (index, record) in chain {
            let outcome = match self.persist_record(&record).await {
                Ok(()) => {
                    debug!(index, id = ?record.id, "Record persisted");
                    RecordOutcome::Persisted(record)
                }
                Err(e) => {
                    warn!(index, error = %e, code = e.code(), "Skipping record");
                    RecordOutcome::Skipped(e)
                }
            };
            settled.push((index, outcome));
        }
        settled
    }

    async fn persist_record(&self, record: &QueuedRecord) -> Result<(), PipelineError> {
        let (product, stock) = record.to_store_records();

        self.store
            .upsert(&product, &stock)
            .await
            .map_err(|e| PipelineError::Persistence {
                id: product.id.clone(),
                message: describe(&e),
            })
    }

    /// Best-effort: a publish failure is logged and reported as `false`
    async fn publish(&self, summary: &BatchSummary) -> bool {
        let notification = match summary.to_notification() {
            Ok(notification) => notification,
            Err(e) => {
                error!(error = %e, "Failed to encode batch notification");
                metrics::counter!("import.notifications.failed").increment(1);
                return false;
            }
        };

        match self.sink.publish(&notification).await {
            Ok(()) => {
                metrics::counter!("import.notifications.published").increment(1);
                true
            }
            Err(e) => {
                let e = PipelineError::Notification(describe(&e));
                error!(error = %e, "Failed to publish batch notification");
                metrics::counter!("import.notifications.failed").increment(1);
                false
            }
        }
    }
}

/// Decode, validate and assign an id
fn prepare_record(body: &[u8]) -> Result<QueuedRecord, PipelineError> {
    let candidate = QueuedRecord::decode_candidate(body)?;
    Ok(QueuedRecord::from_candidate(&candidate)?.with_assigned_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PriceCategory, PRICE_CATEGORY_ATTRIBUTE};
    use crate::ports::{MockCatalogStore, MockNotificationSink};

    fn consumer(
        store: MockCatalogStore,
        sink: MockNotificationSink,
        policy: PersistenceFailurePolicy,
    ) -> BatchConsumer {
        BatchConsumer::new(
            Arc::new(store),
            Arc::new(sink),
            BatchSettings {
                price_threshold: 20.0,
                failure_policy: policy,
            },
        )
    }

    fn accepting_store() -> MockCatalogStore {
        let mut store = MockCatalogStore::new();
        store.expect_upsert().returning(|_, _| Ok(()));
        store
    }

    #[tokio::test]
    async fn test_invalid_record_is_excluded() {
        let mut store = MockCatalogStore::new();
        store
            .expect_upsert()
            .withf(|product, stock| product.id == "999" && stock.count == 1)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut sink = MockNotificationSink::new();
        sink.expect_publish()
            .withf(|n| n.attribute(PRICE_CATEGORY_ATTRIBUTE) == Some("high"))
            .times(1)
            .returning(|_| Ok(()));

        let bodies = [
            r#"{"id":"1","price":10,"count":1}"#,
            r#"{"id":"999","title":"Valid Product","price":50,"count":1}"#,
        ];
        let report = consumer(store, sink, PersistenceFailurePolicy::Skip)
            .handle(&bodies)
            .await
            .unwrap();

        assert_eq!(report.received, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.summary.processed_count, 1);
        assert_eq!(report.summary.items[0].title, "Valid Product");
        assert!(report.notified);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_skipped() {
        let mut sink = MockNotificationSink::new();
        sink.expect_publish().times(1).returning(|_| Ok(()));

        let bodies = [
            "{ not valid JSON",
            r#"{"title":"No ID","price":"20","count":"2"}"#,
        ];
        let report = consumer(accepting_store(), sink, PersistenceFailurePolicy::Skip)
            .handle(&bodies)
            .await
            .unwrap();

        assert_eq!(report.summary.processed_count, 1);
        assert!(report.summary.items[0].id.is_some());
        assert_eq!(report.summary.price_category, PriceCategory::High);
    }

    #[tokio::test]
    async fn test_empty_batch_publishes_high() {
        let mut store = MockCatalogStore::new();
        store.expect_upsert().never();

        let mut sink = MockNotificationSink::new();
        sink.expect_publish()
            .withf(|n| {
                let payload: serde_json::Value = serde_json::from_slice(&n.payload).unwrap();
                payload["summary"] == "Successfully processed 0 product(s)"
                    && n.attribute(PRICE_CATEGORY_ATTRIBUTE) == Some("high")
            })
            .times(1)
            .returning(|_| Ok(()));

        let bodies: [&str; 0] = [];
        let report = consumer(store, sink, PersistenceFailurePolicy::Skip)
            .handle(&bodies)
            .await
            .unwrap();
        assert_eq!(report.summary.processed_count, 0);
    }

    #[tokio::test]
    async fn test_min_price_below_threshold_is_low() {
        let mut sink = MockNotificationSink::new();
        sink.expect_publish()
            .withf(|n| n.attribute(PRICE_CATEGORY_ATTRIBUTE) == Some("low"))
            .times(1)
            .returning(|_| Ok(()));

        let bodies = [
            r#"{"id":"1","title":"Widget","price":"15","count":"5"}"#,
            r#"{"id":"2","title":"Gadget","price":"25","count":"3"}"#,
        ];
        let report = consumer(accepting_store(), sink, PersistenceFailurePolicy::Skip)
            .handle(&bodies)
            .await
            .unwrap();

        assert_eq!(report.summary.processed_count, 2);
        assert_eq!(report.summary.price_category, PriceCategory::Low);
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_batch() {
        let mut sink = MockNotificationSink::new();
        sink.expect_publish()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("topic not found")));

        let bodies = [r#"{"title":"Widget","price":5}"#];
        let report = consumer(accepting_store(), sink, PersistenceFailurePolicy::Skip)
            .handle(&bodies)
            .await
            .unwrap();

        assert_eq!(report.summary.processed_count, 1);
        assert!(!report.notified);
    }

    #[tokio::test]
    async fn test_persistence_failure_skips_by_default() {
        let mut store = MockCatalogStore::new();
        store
            .expect_upsert()
            .returning(|product, _| match product.id.as_str() {
                "1" => Err(anyhow::anyhow!("throughput exceeded")),
                _ => Ok(()),
            });

        let mut sink = MockNotificationSink::new();
        sink.expect_publish().times(1).returning(|_| Ok(()));

        let bodies = [
            r#"{"id":"1","title":"A","price":1}"#,
            r#"{"id":"2","title":"B","price":30}"#,
        ];
        let report = consumer(store, sink, PersistenceFailurePolicy::Skip)
            .handle(&bodies)
            .await
            .unwrap();

        assert_eq!(report.summary.processed_count, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.summary.price_category, PriceCategory::High);
    }

    #[tokio::test]
    async fn test_persistence_failure_can_fail_batch() {
        let mut store = MockCatalogStore::new();
        store
            .expect_upsert()
            .returning(|_, _| Err(anyhow::anyhow!("throughput exceeded")));

        let mut sink = MockNotificationSink::new();
        sink.expect_publish().never();

        let bodies = [r#"{"id":"1","title":"A","price":1}"#];
        let err = consumer(store, sink, PersistenceFailurePolicy::FailBatch)
            .handle(&bodies)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Persistence { ref id, .. } if id == "1"));
    }

    #[tokio::test]
    async fn test_validation_failure_never_fails_batch() {
        let mut sink = MockNotificationSink::new();
        sink.expect_publish().times(1).returning(|_| Ok(()));

        let bodies = [r#"{"title":"A","price":"n/a"}"#];
        let report = consumer(accepting_store(), sink, PersistenceFailurePolicy::FailBatch)
            .handle(&bodies)
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_repeated_id_is_written_in_delivery_order() {
        let mut store = MockCatalogStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_upsert()
            .withf(|product, stock| product.id == "7" && stock.count == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        store
            .expect_upsert()
            .withf(|product, stock| product.id == "7" && stock.count == 2)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        store
            .expect_upsert()
            .withf(|product, _| product.id == "8")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut sink = MockNotificationSink::new();
        sink.expect_publish().times(1).returning(|_| Ok(()));

        let bodies = [
            r#"{"id":"7","title":"Lamp","price":12,"count":1}"#,
            r#"{"id":"8","title":"Desk","price":90,"count":4}"#,
            r#"{"id":"7","title":"Lamp","price":12,"count":2}"#,
        ];
        let report = consumer(store, sink, PersistenceFailurePolicy::Skip)
            .handle(&bodies)
            .await
            .unwrap();

        assert_eq!(report.summary.processed_count, 3);
        let ids: Vec<_> = report
            .summary
            .items
            .iter()
            .map(|r| r.id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["7", "8", "7"]);
    }
}
