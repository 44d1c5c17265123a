use crate::error::{AppError, AppResult};
use crate::geo::raw_feature::RawFeature;
use geojson::{FeatureCollection, GeoJson};
use std::convert::TryFrom;

/// Reads features out of a parsed GeoJSON `FeatureCollection`. GeoJSON has
/// no concept of layers, so `layer_name` is always `"default"`.
pub struct GeoJsonReader {
    collection: FeatureCollection,
}

pub const DEFAULT_LAYER: &str = "default";

impl GeoJsonReader {
    pub fn parse(bytes: &[u8]) -> AppResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| AppError::InvalidFile(format!("not valid UTF-8: {}", e)))?;

        let geojson = text
            .parse::<GeoJson>()
            .map_err(|e| AppError::CorruptedGeometry(format!("invalid GeoJSON: {}", e)))?;

        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            GeoJson::Feature(f) => FeatureCollection {
                bbox: f.bbox.clone(),
                features: vec![f],
                foreign_members: None,
            },
            GeoJson::Geometry(_) => {
                return Err(AppError::InvalidFile(
                    "expected a Feature or FeatureCollection, got a bare Geometry".to_string(),
                ))
            }
        };

        Ok(Self { collection })
    }

    pub fn layers(&self) -> Vec<String> {
        vec![DEFAULT_LAYER.to_string()]
    }

    pub fn feature_count(&self) -> usize {
        self.collection.features.len()
    }

    pub fn features(&self) -> AppResult<Vec<RawFeature>> {
        let mut out = Vec::with_capacity(self.collection.features.len());

        for feature in &self.collection.features {
            let geometry = feature
                .geometry
                .as_ref()
                .ok_or_else(|| AppError::CorruptedGeometry("feature has no geometry".to_string()))?;

            let geo_geometry = geo_types::Geometry::<f64>::try_from(geometry.clone())
                .map_err(|e| AppError::CorruptedGeometry(format!("{}", e)))?;

            let properties = feature
                .properties
                .clone()
                .map(serde_json::Value::Object)
                .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

            // Resolved in order: top-level `id`, `properties.id`,
            // `properties.feature_id`; first present wins.
            let id = feature
                .id
                .as_ref()
                .map(|id| match id {
                    geojson::feature::Id::String(s) => s.clone(),
                    geojson::feature::Id::Number(n) => n.to_string(),
                })
                .or_else(|| property_id_string(&properties, "id"))
                .or_else(|| property_id_string(&properties, "feature_id"));

            out.push(RawFeature {
                id,
                geometry: geo_geometry,
                properties,
            });
        }

        Ok(out)
    }
}

fn property_id_string(properties: &serde_json::Value, key: &str) -> Option<String> {
    let value = properties.get(key)?;
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feature_collection() {
        let raw = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "id": "r1",
                    "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]},
                    "properties": {"name": "Main St"}
                }
            ]
        }"#;

        let reader = GeoJsonReader::parse(raw.as_bytes()).unwrap();
        assert_eq!(reader.feature_count(), 1);

        let features = reader.features().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_falls_back_to_properties_id_when_top_level_id_absent() {
        let raw = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]},
                    "properties": {"id": "r1"}
                }
            ]
        }"#;

        let features = GeoJsonReader::parse(raw.as_bytes()).unwrap().features().unwrap();
        assert_eq!(features[0].id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_falls_back_to_properties_feature_id_when_others_absent() {
        let raw = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]},
                    "properties": {"feature_id": "r2"}
                }
            ]
        }"#;

        let features = GeoJsonReader::parse(raw.as_bytes()).unwrap().features().unwrap();
        assert_eq!(features[0].id.as_deref(), Some("r2"));
    }

    #[test]
    fn test_parse_rejects_bare_geometry() {
        let raw = r#"{"type": "LineString", "coordinates": [[0,0],[1,1]]}"#;
        let result = GeoJsonReader::parse(raw.as_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let result = GeoJsonReader::parse(b"not json");
        assert!(result.is_err());
    }
}
