use serde::{Deserialize, Serialize};

/// Only four observable states; validation progress is tracked through
/// `ImportJob`/`ValidationResult` rows, not by mutating this status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Draft,
    Published,
    Archived,
    RolledBack,
}

impl VersionStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "draft" => Self::Draft,
            "published" => Self::Published,
            "archived" => Self::Archived,
            "rolled_back" => Self::RolledBack,
            other => panic!("unknown version status: {other}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
            Self::RolledBack => "rolled_back",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    OfficialLedger,
    Manual,
    OsmTest,
}

impl DataSource {
    pub fn parse(s: &str) -> Self {
        match s {
            "official_ledger" => Self::OfficialLedger,
            "manual" => Self::Manual,
            "osm_test" => Self::OsmTest,
            other => panic!("unknown data source: {other}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OfficialLedger => "official_ledger",
            Self::Manual => "manual",
            Self::OsmTest => "osm_test",
        }
    }

    /// Non-panicking check for validating caller-supplied strings (request
    /// bodies), where `parse` (which panics on garbage) would be unsafe to
    /// call directly.
    pub fn is_valid(s: &str) -> bool {
        matches!(s, "official_ledger" | "manual" | "osm_test")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportVersion {
    pub id: i64,
    pub version_number: i64,
    pub status: String,
    pub source_filename: String,
    pub source_format: String,
    pub source_layer: Option<String>,
    pub crs: Option<String>,
    pub scope: Option<String>,
    pub default_data_source: String,
    pub regional_refresh: bool,
    pub source_export_id: Option<String>,
    pub feature_count: Option<i64>,
    pub upload_blob_hash: String,
    pub snapshot_blob_hash: Option<String>,
    pub diff_blob_hash: Option<String>,
    pub added_count: Option<i64>,
    pub updated_count: Option<i64>,
    pub deactivated_count: Option<i64>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub published_at: Option<String>,
    pub archived_at: Option<String>,
    pub rolled_back_at: Option<String>,
    /// The version whose publish superseded this one (set alongside
    /// `archived_at`/`rolled_back_at`). Its `snapshotBlobHash` is, by
    /// construction, the live state right after this version was published
    /// — the pre-publish snapshot of whatever came next.
    pub superseded_by_version_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VersionListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionListResponse {
    pub data: Vec<ImportVersion>,
    pub total: i64,
}

/// Body accepted by `POST /import/versions/{id}/configure`. `scope` is an
/// optional override (`full`, `ward:<name>`, or
/// `bbox:minLng,minLat,maxLng,maxLat`); when absent the Diff Engine
/// auto-derives `bbox:<file bbox>` from the uploaded file at diff/publish
/// time.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureDraftRequest {
    pub layer_name: String,
    pub source_crs: String,
    pub default_data_source: String,
    #[serde(default)]
    pub regional_refresh: bool,
    pub scope: Option<String>,
    pub source_export_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerInfo {
    pub name: String,
    pub feature_count: i64,
    pub geometry_type: String,
}
