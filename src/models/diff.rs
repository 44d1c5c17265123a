use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub feature_index: usize,
    pub feature_id: Option<String>,
    pub kind: String,
    pub message: String,
    pub field: Option<String>,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub feature_count: i64,
    pub error_count: i64,
    pub warning_count: i64,
    pub missing_id_count: i64,
    pub missing_data_source_count: i64,
    pub geometry_types: Vec<String>,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffMode {
    Incremental,
    RegionalRefresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDiff {
    pub road_id: String,
    pub classification: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub added: i64,
    pub updated: i64,
    pub removed: i64,
    pub unchanged: i64,
    pub changes: Vec<FeatureDiff>,
}

impl DiffResult {
    pub fn empty() -> Self {
        Self {
            added: 0,
            updated: 0,
            removed: 0,
            unchanged: 0,
            changes: Vec::new(),
        }
    }
}
