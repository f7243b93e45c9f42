// MapApi HTTP client
use super::{ApiError, PredictionSource};
use crate::filters::{DateFilter, DateRange};
use crate::models::{Incident, Prediction};
use log::{debug, warn};
use serde::Deserialize;
use url::Url;

// ============= HTTP Client Helpers =============

fn call(request: ureq::Request) -> Result<ureq::Response, ApiError> {
    match request.call() {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(status, response)) => {
            let message = response
                .into_string()
                .unwrap_or_else(|_| "unknown error".to_string());
            Err(ApiError::Status { status, message })
        }
        Err(e) => Err(ApiError::Transport(e.to_string())),
    }
}

fn send_json(request: ureq::Request, body: serde_json::Value) -> Result<ureq::Response, ApiError> {
    match request.send_json(body) {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(status, response)) => {
            let message = response
                .into_string()
                .unwrap_or_else(|_| "unknown error".to_string());
            Err(ApiError::Status { status, message })
        }
        Err(e) => Err(ApiError::Transport(e.to_string())),
    }
}

fn into_json<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T, ApiError> {
    let content_type = response.content_type().to_string();
    if !content_type.contains("json") {
        return Err(ApiError::Parse(format!(
            "unexpected content type: {}",
            content_type
        )));
    }
    response
        .into_json::<T>()
        .map_err(|e| ApiError::Parse(e.to_string()))
}

/// The prediction endpoint answers with a single object, an array (most
/// recent first), or an empty array/object when nothing has been computed yet.
fn parse_prediction_payload(payload: serde_json::Value) -> Result<Option<Prediction>, ApiError> {
    match payload {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Array(items) => match items.into_iter().next() {
            Some(first) => serde_json::from_value(first)
                .map(Some)
                .map_err(|e| ApiError::Parse(e.to_string())),
            None => Ok(None),
        },
        serde_json::Value::Object(ref map) if map.is_empty() => Ok(None),
        serde_json::Value::Object(_) => serde_json::from_value(payload)
            .map(Some)
            .map_err(|e| ApiError::Parse(e.to_string())),
        other => Err(ApiError::Parse(format!(
            "unexpected prediction payload: {}",
            other
        ))),
    }
}

#[derive(Deserialize)]
struct MonthPayload {
    data: Vec<Incident>,
}

/// Client for the MapApi backend
pub struct MapApiClient {
    base_url: String,
    auth_token: Option<String>,
}

impl MapApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Url::parse(base_url)
            .map_err(|e| ApiError::Transport(format!("invalid base url '{}': {}", base_url, e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn request(&self, method: &str, endpoint: &str) -> Result<ureq::Request, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let req = match method {
            "GET" => ureq::get(&url),
            "POST" => ureq::post(&url),
            _ => return Err(ApiError::Transport(format!("unsupported method: {}", method))),
        };

        // Add auth token if available
        match &self.auth_token {
            Some(token) => Ok(req.set("Authorization", &format!("Bearer {}", token))),
            None => Ok(req),
        }
    }

    /// Incidents matching a resolved date filter.
    /// `custom` is only consulted for [`DateFilter::CustomRange`].
    pub fn filtered_incidents(
        &self,
        filter: DateFilter,
        custom: Option<DateRange>,
    ) -> Result<Vec<Incident>, ApiError> {
        let mut endpoint = format!("/MapApi/incident-filter/?filter_type={}", filter);
        if filter == DateFilter::CustomRange {
            if let Some(range) = custom {
                endpoint.push_str(&format!(
                    "&custom_start={}&custom_end={}",
                    range.start.format("%Y-%m-%d"),
                    range.end.format("%Y-%m-%d")
                ));
            }
        }

        debug!("Fetching incidents: {}", endpoint);
        let response = call(self.request("GET", &endpoint)?)?;
        into_json(response)
    }

    /// Incidents reported in a given month (1-12), for the zone chart
    pub fn incidents_by_month(&self, month: u32) -> Result<Vec<Incident>, ApiError> {
        let endpoint = format!("/MapApi/incidentByMonth/?month={}", month);
        let response = call(self.request("GET", &endpoint)?)?;
        let payload: MonthPayload = into_json(response)?;
        Ok(payload.data)
    }
}

impl PredictionSource for MapApiClient {
    fn fetch_prediction(&self, incident_id: u64) -> Result<Option<Prediction>, ApiError> {
        let endpoint = format!("/MapApi/Incidentprediction/{}/", incident_id);
        debug!("Fetching prediction for incident {}", incident_id);

        let response = call(self.request("GET", &endpoint)?)?;
        let payload: serde_json::Value = into_json(response)?;
        parse_prediction_payload(payload)
    }

    fn request_generation(&self, incident_id: u64) -> Result<(), ApiError> {
        debug!("Requesting analysis generation for incident {}", incident_id);

        let request = self.request("POST", "/MapApi/Incidentprediction/")?;
        let body = serde_json::json!({ "incident_id": incident_id });
        if let Err(e) = send_json(request, body) {
            warn!(
                "Generation request for incident {} rejected: {}",
                incident_id, e
            );
            return Err(e);
        }
        Ok(())
    }
}
