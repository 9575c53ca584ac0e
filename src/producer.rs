//! Republishes decoded feed snapshots onto the stream, one record per vehicle.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::gtfs_rt::FeedMessage;
use crate::record::VehicleUpdate;
use crate::stats::PublishReport;
use crate::transport::{PublishEntry, StreamTransport};

/// Upper bound on entries per publish call (the Kinesis PutRecords limit).
pub const MAX_PUBLISH_BATCH: usize = 500;

/// Extracts one [`VehicleUpdate`] per vehicle entity of `feed`.
///
/// Every record carries the feed header timestamp as its source timestamp.
pub fn snapshot_to_updates(feed: &FeedMessage) -> Vec<VehicleUpdate> {
    let source_timestamp = feed.header.timestamp.unwrap_or(0);
    feed.entity
        .iter()
        .filter_map(|entity| VehicleUpdate::from_entity(entity, source_timestamp))
        .collect()
}

pub struct Producer<T> {
    transport: Arc<T>,
    stream: String,
    batch_size: usize,
}

impl<T: StreamTransport> Producer<T> {
    pub fn new(transport: Arc<T>, stream: impl Into<String>) -> Self {
        Self {
            transport,
            stream: stream.into(),
            batch_size: MAX_PUBLISH_BATCH,
        }
    }

    /// Smaller batches; never above [`MAX_PUBLISH_BATCH`].
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.clamp(1, MAX_PUBLISH_BATCH);
        self
    }

    /// Publishes every vehicle of `feed` keyed by vehicle id.
    ///
    /// Failures are counted per call and never abort the snapshot; a call
    /// that fails outright counts its whole batch as failed.
    #[tracing::instrument(
        skip(self, feed),
        fields(stream = %self.stream, entities = feed.entity.len())
    )]
    pub async fn publish_snapshot(&self, feed: &FeedMessage) -> PublishReport {
        let updates = snapshot_to_updates(feed);
        let mut report = PublishReport {
            entities: feed.entity.len(),
            vehicles: updates.len(),
            ..Default::default()
        };

        let mut entries = Vec::with_capacity(updates.len());
        for update in &updates {
            match update.to_payload() {
                Ok(payload) => entries.push(PublishEntry {
                    partition_key: update.id.clone(),
                    payload,
                }),
                Err(e) => {
                    warn!(vehicle_id = %update.id, error = %e, "Could not encode vehicle update");
                    report.failed += 1;
                }
            }
        }

        for chunk in entries.chunks(self.batch_size) {
            report.batches += 1;
            match self.transport.publish(&self.stream, chunk.to_vec()).await {
                Ok(outcome) => {
                    report.published += outcome.accepted;
                    report.failed += outcome.failed;
                    if outcome.failed > 0 {
                        warn!(
                            failed = outcome.failed,
                            batch = chunk.len(),
                            "Publish call had failed records"
                        );
                    }
                }
                Err(e) => {
                    error!(error = %e, batch = chunk.len(), "Publish call failed");
                    report.failed += chunk.len();
                }
            }
        }

        info!(
            vehicles = report.vehicles,
            published = report.published,
            failed = report.failed,
            batches = report.batches,
            "Snapshot published"
        );
        report
    }
}
