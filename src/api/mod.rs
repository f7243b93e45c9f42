// MapApi access layer
pub mod client;

pub use client::MapApiClient;

use crate::models::Prediction;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server error {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
}

/// Backend operations the readiness controller depends on.
///
/// Implemented by [`MapApiClient`] against the real backend; tests substitute
/// scripted sources. Implementations may block, callers drive them through
/// `spawn_blocking`.
pub trait PredictionSource: Send + Sync {
    /// Look up the stored prediction for an incident. An empty payload from
    /// the server means "nothing yet" and is `Ok(None)`, never an error.
    fn fetch_prediction(&self, incident_id: u64) -> Result<Option<Prediction>, ApiError>;

    /// Ask the analysis service to compute a prediction for an incident.
    fn request_generation(&self, incident_id: u64) -> Result<(), ApiError>;
}
