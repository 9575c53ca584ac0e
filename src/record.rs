//! The per-vehicle record carried on the stream.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::gtfs_rt::FeedEntity;

/// Meters per second to miles per hour.
const MPS_TO_MPH: f64 = 2.236_936;

/// Latest observed state of one vehicle, as published to the stream.
///
/// `id` is the stream partition key. Records are immutable once built; the
/// consumer only ever replaces a cached record with a newer arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleUpdate {
    pub id: String,
    #[serde(default)]
    pub trip_id: String,
    #[serde(default)]
    pub route_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub vehicle_timestamp: i64,
    pub source_timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mph: Option<f64>,
}

impl VehicleUpdate {
    /// Builds a record from a feed entity carrying a vehicle position.
    ///
    /// `source_timestamp` is the feed header timestamp shared by every record
    /// of the snapshot. Returns `None` for entities without a vehicle, without
    /// a position, or with an empty id.
    pub fn from_entity(entity: &FeedEntity, source_timestamp: u64) -> Option<Self> {
        if entity.id.is_empty() || entity.is_deleted.unwrap_or(false) {
            return None;
        }

        let vehicle = entity.vehicle.as_ref()?;
        let position = vehicle.position.as_ref()?;
        let trip = vehicle.trip.as_ref();

        Some(VehicleUpdate {
            id: entity.id.clone(),
            trip_id: trip.and_then(|t| t.trip_id.clone()).unwrap_or_default(),
            route_id: trip.and_then(|t| t.route_id.clone()).unwrap_or_default(),
            latitude: f64::from(position.latitude),
            longitude: f64::from(position.longitude),
            vehicle_timestamp: vehicle.timestamp.unwrap_or(0) as i64,
            source_timestamp: source_timestamp as f64,
            speed_mph: position.speed.map(|mps| f64::from(mps) * MPS_TO_MPH),
        })
    }

    /// Speed used by filters and sorting; a missing reading counts as stopped.
    pub fn speed_or_zero(&self) -> f64 {
        self.speed_mph.unwrap_or(0.0)
    }

    /// JSON payload for a stream record.
    pub fn to_payload(&self) -> Result<Bytes, serde_json::Error> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Parses a stream record payload, rejecting records without an id.
    pub fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        let update: VehicleUpdate = serde_json::from_slice(payload)?;
        if update.id.is_empty() {
            return Err(DecodeError::MissingId);
        }
        Ok(update)
    }
}
