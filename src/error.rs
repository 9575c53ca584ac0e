//! Error types for the stream consumer and producer.
//!
//! None of these are fatal to a running consumer: the fetch cycle turns every
//! [`TransportError`] into a tick status and drops records that fail to decode.

use thiserror::Error;

/// Failures reported by a [`StreamTransport`](crate::transport::StreamTransport).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The read position aged past the stream's retention guarantee.
    /// The cursor must be discarded and re-acquired.
    #[error("cursor expired for partition {partition}")]
    CursorExpired { partition: String },
    /// Connectivity, throttling, timeout or any other service-side failure.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        TransportError::Unavailable(message.into())
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, TransportError::CursorExpired { .. })
    }
}

/// A single stream record whose payload is not a usable vehicle update.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid vehicle payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("vehicle update has an empty id")]
    MissingId,
}
