use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::PathBuf;

pub static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("ROADNET_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/data"))
});

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| DATA_DIR.join("config.yaml"));
pub static DATABASE_PATH: Lazy<PathBuf> = Lazy::new(|| DATA_DIR.join("database.sqlite"));
pub static UPLOADS_DIR: Lazy<PathBuf> = Lazy::new(|| DATA_DIR.join("blobs/uploads"));
pub static SNAPSHOTS_DIR: Lazy<PathBuf> = Lazy::new(|| DATA_DIR.join("blobs/snapshots"));
pub static DIFFS_DIR: Lazy<PathBuf> = Lazy::new(|| DATA_DIR.join("blobs/diffs"));

pub static SUPPORTED_EXTENSIONS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| [".gpkg", ".geojson", ".json"].into_iter().collect());

pub const DEFAULT_EPSILON_GEOM: f64 = 1e-7;
pub const DEFAULT_MAX_VALIDATION_ERRORS: usize = 500;
pub const DEFAULT_PUBLISH_LOCK_TIMEOUT_SECS: u64 = 30;
