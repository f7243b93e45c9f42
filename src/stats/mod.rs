// Dashboard chart aggregations
pub mod zone;

pub use zone::{aggregate_by_zone, ZoneBreakdown};
