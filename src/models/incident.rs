// Incident data models
use serde::{Deserialize, Serialize};

/// Lifecycle state of a reported incident
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    Declared,
    TakenIntoAccount,
    Resolved,
}

impl IncidentState {
    /// Marker color the dashboard map uses for this state
    pub fn marker_color(&self) -> &'static str {
        match self {
            IncidentState::Declared => "red",
            IncidentState::TakenIntoAccount => "orange",
            IncidentState::Resolved => "blue",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Incident {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub zone: String,
    // The API spells this field "lattitude"
    #[serde(rename = "lattitude", default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub etat: IncidentState,
    #[serde(default)]
    pub type_incident: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    /// Absent for anonymous reports
    #[serde(default)]
    pub user_id: Option<u64>,
    /// User id of the organisation that took the incident into account
    #[serde(default)]
    pub taken_by: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Incident {
    /// Whether the incident can be placed on the map
    pub fn has_location(&self) -> bool {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => lat.is_finite() && lon.is_finite(),
            _ => false,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }
}
