pub mod analysis;
pub mod api;
pub mod filters;
pub mod models;
pub mod stats;

pub use analysis::{
    FailureReason, IncidentInputs, ReadinessController, ReadinessState, ReportPreview,
};
pub use api::{ApiError, MapApiClient, PredictionSource};
pub use filters::{DateFilter, DateRange, UnknownFilter};
pub use models::{Incident, IncidentState, Prediction};
