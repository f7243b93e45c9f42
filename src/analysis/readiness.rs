// Readiness state machine for incident analysis reports
use crate::models::Prediction;
use serde::Serialize;
use thiserror::Error;

/// Classification value marking an incident as not worth analyzing
pub const NO_ISSUE_CLASSIFICATION: &str = "no environmental issue";

/// Why a controller ended up in [`ReadinessState::Failed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The incident has no source image, the analysis service would reject it
    #[error("no source image available for analysis")]
    MissingImage,
    /// The prediction lookup failed (network or malformed response)
    #[error("prediction lookup failed")]
    Lookup,
    /// The generation request was rejected by the analysis service
    #[error("generation request failed")]
    Generation,
}

/// Tracked status of prediction availability for one mounted incident view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReadinessState {
    /// Classification says no analysis is warranted; terminal
    Skipped,
    /// A lookup is in flight
    Checking,
    /// No report yet; generation was requested at most once and the single
    /// convenience re-check is armed or already spent
    AwaitingGeneration,
    /// Report available; terminal
    Ready { prediction: Prediction },
    /// Terminal for this mount, a fresh mount is the only retry path
    Failed { reason: FailureReason },
}

impl ReadinessState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReadinessState::Skipped | ReadinessState::Ready { .. } | ReadinessState::Failed { .. }
        )
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            ReadinessState::Ready { prediction } => Some(prediction),
            _ => None,
        }
    }
}

/// Whether a classification rules out analysis entirely.
/// The backend emits inconsistent casing for free-text classifications, so the
/// comparison is trimmed and ASCII case-insensitive.
pub fn analysis_skipped(classification: &str) -> bool {
    classification
        .trim()
        .eq_ignore_ascii_case(NO_ISSUE_CLASSIFICATION)
}

/// What to do when the prediction lookup came back empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyLookupAction {
    /// First empty result with a usable image: ask the service to generate
    RequestGeneration,
    /// Generation already requested; the report just has not landed yet
    KeepWaiting,
    /// No input image, generation must not be attempted
    FailMissingImage,
}

/// Core decision for an empty lookup, kept pure so it can be tested directly
pub fn empty_lookup_action(has_image: bool, generation_sent: bool) -> EmptyLookupAction {
    if generation_sent {
        EmptyLookupAction::KeepWaiting
    } else if has_image {
        EmptyLookupAction::RequestGeneration
    } else {
        EmptyLookupAction::FailMissingImage
    }
}
