use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Road {
    pub id: String,
    pub version_id: i64,
    pub status: String,
    pub geometry: Value,
    pub properties: Value,
    pub data_source: String,
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
    pub replaced_by: Option<String>,
    pub valid_from: String,
    pub valid_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadHistoryEntry {
    pub road_id: String,
    pub version_id: i64,
    pub geometry: Value,
    pub properties: Value,
    pub valid_from: String,
    pub valid_to: String,
}
