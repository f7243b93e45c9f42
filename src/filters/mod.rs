// Incident query filters
pub mod date_range;

pub use date_range::{resolve, resolve_on, DateFilter, DateRange, UnknownFilter};
