use geo_types::Geometry;
use serde_json::Value;

/// A single feature read from a source file, before validation or CRS
/// transformation. `id` is whatever stable identity field the source
/// carries (a GeoJSON `id`, or a GeoPackage feature id) — `None` if the
/// source never assigns one.
#[derive(Debug, Clone)]
pub struct RawFeature {
    pub id: Option<String>,
    pub geometry: Geometry<f64>,
    pub properties: Value,
}
