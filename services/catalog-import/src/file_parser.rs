//! Stream parser and relocator.
//!
//! For every object-created event under the intake prefix the parser walks
//! `Fetching -> Parsing -> Relaying(n) -> Relocating -> Done`:
//!
//! - the object is opened as a byte stream and decoded as CSV with a header
//!   row, one record at a time;
//! - each record is relayed to the row queue on its own task, bounded by a
//!   semaphore;
//! - all relay tasks are joined before anything else happens to the object;
//! - the object is copied to the processed prefix and the original deleted.
//!
//! A malformed record stops the event with [`PipelineError::Parse`] and the
//! object stays in the intake prefix. A failed relay is counted and logged but
//! does not stop the event.

use crate::error::{describe, PipelineError};
use crate::model::{IntakeLayout, ObjectCreatedEvent, RawRow};
use crate::ports::{ObjectReader, ObjectStore, RowQueue};
use csv_async::AsyncReaderBuilder;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Body returned to the trigger on success
pub const SUCCESS_BODY: &str = "CSV processing complete";

/// Outcome for one relocated file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub container: String,
    pub key: String,
    pub processed_key: String,
    pub rows_relayed: usize,
    pub rows_failed: usize,
}

/// Outcome for one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseReport {
    pub files: Vec<FileReport>,
    /// Keys outside the intake prefix that were ignored
    pub skipped: Vec<String>,
}

impl ParseReport {
    pub fn rows_relayed(&self) -> usize {
        self.files.iter().map(|f| f.rows_relayed).sum()
    }

    pub fn rows_failed(&self) -> usize {
        self.files.iter().map(|f| f.rows_failed).sum()
    }
}

/// Status/body pair reported back to the trigger
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

impl TriggerResponse {
    pub fn from_result(result: &Result<ParseReport, PipelineError>) -> Self {
        match result {
            Ok(_) => Self {
                status_code: 200,
                body: serde_json::Value::String(SUCCESS_BODY.to_string()),
            },
            Err(e) => Self {
                status_code: 500,
                body: serde_json::json!({ "message": e.to_string() }),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RelayTally {
    relayed: usize,
    failed: usize,
}

/// Parses intake files and relays their rows to the queue
pub struct FileParser {
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn RowQueue>,
    layout: IntakeLayout,
    relay_concurrency: usize,
}

impl FileParser {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn RowQueue>,
        layout: IntakeLayout,
        relay_concurrency: usize,
    ) -> Self {
        Self {
            store,
            queue,
            layout,
            relay_concurrency: relay_concurrency.max(1),
        }
    }

    /// Process an invocation's events one after another.
    ///
    /// Every event is attempted even if an earlier one failed; the invocation
    /// fails with the first error encountered.
    #[instrument(skip(self, events), fields(event_count = events.len()))]
    pub async fn handle(&self, events: &[ObjectCreatedEvent]) -> Result<ParseReport, PipelineError> {
        let mut report = ParseReport::default();
        let mut first_error = None;

        for event in events {
            let Some(processed_key) = self.layout.processed_key(&event.key) else {
                warn!(
                    container = %event.container_name,
                    key = %event.key,
                    "Ignoring object outside the intake prefix"
                );
                metrics::counter!("import.files.skipped").increment(1);
                report.skipped.push(event.key.clone());
                continue;
            };

            match self.process_event(event, processed_key).await {
                Ok(file) => {
                    metrics::counter!("import.files.processed").increment(1);
                    report.files.push(file);
                }
                Err(e) => {
                    error!(
                        error = %e,
                        code = e.code(),
                        container = %event.container_name,
                        key = %event.key,
                        "Failed to process intake file"
                    );
                    metrics::counter!("import.files.failed").increment(1);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    #[instrument(skip(self, event), fields(container = %event.container_name, key = %event.key))]
    async fn process_event(
        &self,
        event: &ObjectCreatedEvent,
        processed_key: String,
    ) -> Result<FileReport, PipelineError> {
        let reader = self
            .store
            .open_read(&event.container_name, &event.key)
            .await
            .map_err(|e| PipelineError::SourceRead {
                container: event.container_name.clone(),
                key: event.key.clone(),
                message: describe(&e),
            })?;

        let tally = self.relay_rows(&event.key, reader).await?;

        if tally.failed > 0 {
            warn!(
                rows_failed = tally.failed,
                rows_relayed = tally.relayed,
                "Some rows could not be relayed"
            );
        }

        self.relocate(event, &processed_key).await?;

        info!(
            processed_key = %processed_key,
            rows_relayed = tally.relayed,
            "Intake file processed"
        );

        Ok(FileReport {
            container: event.container_name.clone(),
            key: event.key.clone(),
            processed_key,
            rows_relayed: tally.relayed,
            rows_failed: tally.failed,
        })
    }

    /// Decode records and fan them out to the queue, then wait for every send.
    ///
    /// The join runs on the error path too, so no send outlives this call.
    async fn relay_rows(&self, key: &str, reader: ObjectReader) -> Result<RelayTally, PipelineError> {
        let parse_error = |e: csv_async::Error| PipelineError::Parse {
            key: key.to_string(),
            message: e.to_string(),
        };

        let mut csv = AsyncReaderBuilder::new()
            .has_headers(true)
            .create_reader(reader);

        let headers = csv.headers().await.map_err(parse_error)?.clone();
        let permits = Arc::new(Semaphore::new(self.relay_concurrency));
        let mut in_flight = JoinSet::new();
        let mut records = csv.records();
        let mut row_number = 0usize;

        let decoded = loop {
            let record = match records.next().await {
                None => break Ok(()),
                Some(Err(e)) => break Err(parse_error(e)),
                Some(Ok(record)) => record,
            };
            row_number += 1;

            let row = RawRow::from_columns(headers.iter(), record.iter());
            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    break Err(PipelineError::Relay {
                        row: row_number,
                        message: e.to_string(),
                    })
                }
            };

            let queue = self.queue.clone();
            let row_index = row_number;
            in_flight.spawn(async move {
                let _permit = permit;
                queue.send(&row).await.map_err(|e| PipelineError::Relay {
                    row: row_index,
                    message: describe(&e),
                })
            });
        };

        let tally = join_relays(&mut in_flight).await;
        decoded?;

        debug!(rows = row_number, "Finished decoding intake file");
        Ok(tally)
    }

    async fn relocate(&self, event: &ObjectCreatedEvent, processed_key: &str) -> Result<(), PipelineError> {
        let relocation_error = |e: anyhow::Error| PipelineError::Relocation {
            from: event.key.clone(),
            to: processed_key.to_string(),
            message: describe(&e),
        };

        self.store
            .copy(&event.container_name, &event.key, processed_key)
            .await
            .map_err(relocation_error)?;

        // The copy has landed; a crash from here on leaves the object in both
        // prefixes, which re-ingestion tolerates because upserts are keyed.
        self.store
            .delete(&event.container_name, &event.key)
            .await
            .map_err(relocation_error)?;

        Ok(())
    }
}

async fn join_relays(in_flight: &mut JoinSet<Result<(), PipelineError>>) -> RelayTally {
    let mut tally = RelayTally::default();

    while let Some(joined) = in_flight.join_next().await {
        match joined {
            Ok(Ok(())) => tally.relayed += 1,
            Ok(Err(e)) => {
                warn!(error = %e, "Row relay failed");
                tally.failed += 1;
            }
            Err(e) => {
                error!(error = %e, "Row relay task aborted");
                tally.failed += 1;
            }
        }
    }

    metrics::counter!("import.rows.relayed").increment(tally.relayed as u64);
    metrics::counter!("import.rows.relay_failed").increment(tally.failed as u64);

    tally
}
