// Incident analysis readiness
pub mod controller;
pub mod readiness;
pub mod report;

pub use controller::{IncidentInputs, ReadinessController, RETRY_DELAY};
pub use readiness::{FailureReason, ReadinessState, NO_ISSUE_CLASSIFICATION};
pub use report::{preview_analysis, ReportPreview, ANALYSIS_PREVIEW_CHARS};
