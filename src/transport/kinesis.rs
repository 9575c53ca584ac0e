use async_trait::async_trait;
use aws_sdk_kinesis::Client;
use aws_sdk_kinesis::config::Region;
use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::{PutRecordsRequestEntry, ShardIteratorType};
use bytes::Bytes;
use tracing::{debug, warn};

use super::{
    PositionKind, PublishEntry, PublishOutcome, ReadResponse, StreamRecord, StreamTransport,
};
use crate::error::TransportError;

/// [`StreamTransport`] backed by AWS Kinesis Data Streams.
///
/// Shard iterators are the cursor tokens. An `ExpiredIteratorException`
/// maps to [`TransportError::CursorExpired`]; every other SDK failure is
/// reported as [`TransportError::Unavailable`].
#[derive(Clone)]
pub struct KinesisTransport {
    client: Client,
}

impl KinesisTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the ambient AWS configuration, pinned to `region`.
    pub async fn from_region(region: &str) -> Self {
        let config = aws_config::from_env()
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl StreamTransport for KinesisTransport {
    async fn describe(&self, stream: &str) -> Result<Vec<String>, TransportError> {
        let output = self
            .client
            .list_shards()
            .stream_name(stream)
            .send()
            .await
            .map_err(|e| TransportError::unavailable(format!("ListShards failed: {e}")))?;

        Ok(output
            .shards()
            .iter()
            .map(|s| s.shard_id().to_string())
            .collect())
    }

    async fn get_cursor(
        &self,
        stream: &str,
        shard: &str,
        position: PositionKind,
    ) -> Result<String, TransportError> {
        let iterator_type = match position {
            PositionKind::Earliest => ShardIteratorType::TrimHorizon,
            PositionKind::Latest => ShardIteratorType::Latest,
        };

        let output = self
            .client
            .get_shard_iterator()
            .stream_name(stream)
            .shard_id(shard)
            .shard_iterator_type(iterator_type)
            .send()
            .await
            .map_err(|e| TransportError::unavailable(format!("GetShardIterator failed: {e}")))?;

        output
            .shard_iterator()
            .map(str::to_string)
            .ok_or_else(|| TransportError::unavailable("GetShardIterator returned no iterator"))
    }

    async fn read(&self, token: &str, limit: usize) -> Result<ReadResponse, TransportError> {
        let limit = i32::try_from(limit.clamp(1, 10_000)).unwrap_or(10_000);
        let output = match self
            .client
            .get_records()
            .shard_iterator(token)
            .limit(limit)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let expired = e
                    .as_service_error()
                    .is_some_and(|se| se.is_expired_iterator_exception());
                if expired {
                    return Err(TransportError::CursorExpired {
                        partition: "shard iterator".to_string(),
                    });
                }
                return Err(TransportError::unavailable(format!("GetRecords failed: {e}")));
            }
        };

        if let Some(behind) = output.millis_behind_latest() {
            debug!(millis_behind_latest = behind, "GetRecords");
        }

        let records = output
            .records()
            .iter()
            .map(|r| StreamRecord {
                partition_key: r.partition_key().unwrap_or_default().to_string(),
                sequence: r.sequence_number().to_string(),
                data: Bytes::copy_from_slice(r.data().as_ref()),
            })
            .collect();

        Ok(ReadResponse {
            records,
            next_token: output.next_shard_iterator().map(str::to_string),
        })
    }

    async fn publish(
        &self,
        stream: &str,
        entries: Vec<PublishEntry>,
    ) -> Result<PublishOutcome, TransportError> {
        let total = entries.len();
        let mut request = Vec::with_capacity(total);
        for entry in entries {
            let built = PutRecordsRequestEntry::builder()
                .data(Blob::new(entry.payload.to_vec()))
                .partition_key(entry.partition_key)
                .build()
                .map_err(|e| TransportError::unavailable(format!("invalid record: {e}")))?;
            request.push(built);
        }

        let output = self
            .client
            .put_records()
            .stream_name(stream)
            .set_records(Some(request))
            .send()
            .await
            .map_err(|e| TransportError::unavailable(format!("PutRecords failed: {e}")))?;

        let failed = output.failed_record_count().unwrap_or(0).max(0) as usize;
        if failed > 0 {
            warn!(failed, total, "PutRecords partially failed");
        }

        Ok(PublishOutcome {
            accepted: total.saturating_sub(failed),
            failed,
        })
    }
}
