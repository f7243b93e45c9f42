// Per-zone incident aggregation for the dashboard bar chart
use crate::models::Incident;
use serde::Serialize;
use std::collections::BTreeMap;

/// Anonymous vs registered report counts for one zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneBreakdown {
    pub zone: String,
    pub anonymous: u32,
    pub registered: u32,
}

/// Fold incidents into per-zone counts, split by whether the report came from
/// a registered account. Zones come out sorted by label, matching the chart's
/// category axis.
pub fn aggregate_by_zone(incidents: &[Incident]) -> Vec<ZoneBreakdown> {
    let mut zones: BTreeMap<&str, (u32, u32)> = BTreeMap::new();

    for incident in incidents {
        let (anonymous, registered) = zones.entry(incident.zone.as_str()).or_default();
        if incident.is_anonymous() {
            *anonymous += 1;
        } else {
            *registered += 1;
        }
    }

    zones
        .into_iter()
        .map(|(zone, (anonymous, registered))| ZoneBreakdown {
            zone: zone.to_string(),
            anonymous,
            registered,
        })
        .collect()
}
