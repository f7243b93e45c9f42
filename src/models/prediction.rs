// Prediction (AI analysis report) data model
use serde::{Deserialize, Serialize};

/// Analysis report generated for one incident by the analysis service.
/// Eventually consistent: the report may not exist yet when the incident is
/// first opened. Once it exists it is never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Prediction {
    #[serde(default)]
    pub incident_id: Option<u64>,
    #[serde(default)]
    pub analysis: Option<String>,
    /// Proposed remediation text
    #[serde(default)]
    pub piste_solution: Option<String>,
    #[serde(default)]
    pub impact_potentiel: Option<String>,
    /// Supplementary visual artifacts produced alongside the report
    #[serde(default)]
    pub images: Vec<String>,
}
