use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One venue returned by the places-search provider. Value object, consumed
/// and discarded within a single assignment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarCandidate {
    pub place_id: String,
    pub name: String,
    pub formatted_address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub rating: Option<f64>,
    pub business_status: Option<String>,
    pub primary_type: Option<String>,
    pub types: Vec<String>,
}

/// The atomic bar write. Field names are the persistence contract shared
/// with existing consumers of the groups table.
#[derive(Debug, Clone, Serialize)]
pub struct BarAssignment {
    pub bar_name: String,
    pub bar_address: String,
    pub bar_place_id: String,
    pub bar_latitude: f64,
    pub bar_longitude: f64,
    pub meeting_time: DateTime<Utc>,
}
