//! Analysis service seam
//!
//! The remote side of the pipeline: identify a recording, then look up the
//! samples used by the identified track.

use crate::recording::AudioPayload;
use async_trait::async_trait;
use digger_common::{IdentifiedTrack, Sample};
use thiserror::Error;

/// Failure of a single remote call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Request never produced a response (connect, timeout, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("API error {0}: {1}")]
    Status(u16, String),

    /// Response body could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request rejected before being sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ServiceError {
    /// HTTP status, when the service answered
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Status(code, _) => Some(*code),
            _ => None,
        }
    }
}

/// Remote identification and sample lookup
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Identify the track playing in a recording
    async fn identify(&self, payload: &AudioPayload) -> Result<IdentifiedTrack, ServiceError>;

    /// Ordered samples used by `title` / `artist` (possibly empty)
    async fn lookup_samples(&self, title: &str, artist: &str) -> Result<Vec<Sample>, ServiceError>;
}
