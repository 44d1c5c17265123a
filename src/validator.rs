use crate::config::ValidationConfig;
use crate::error::AppResult;
use crate::geo::RawFeature;
use crate::models::{ValidationError, ValidationResult};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::winding_order::Winding;
use geo_types::Geometry;
use std::collections::BTreeSet;

/// Streams features through a set of structural checks and accumulates a
/// `ValidationResult`. Mirrors the job-scoped progress-struct shape the
/// background job runner uses elsewhere: callers feed features one at a
/// time and read back the aggregate once the stream is exhausted.
pub struct Validator {
    epsilon_geom: f64,
    max_errors_retained: usize,
    feature_count: i64,
    error_count: i64,
    warning_count: i64,
    missing_id_count: i64,
    missing_data_source_count: i64,
    geometry_types: BTreeSet<String>,
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationError>,
}

impl Validator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            epsilon_geom: config.epsilon_geom,
            max_errors_retained: config.max_errors_retained,
            feature_count: 0,
            error_count: 0,
            warning_count: 0,
            missing_id_count: 0,
            missing_data_source_count: 0,
            geometry_types: BTreeSet::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn feed(&mut self, index: usize, feature: &RawFeature) {
        self.feature_count += 1;
        self.geometry_types.insert(geometry_type_name(&feature.geometry).to_string());

        if let Err((kind, message)) = check_geometry(&feature.geometry, self.epsilon_geom) {
            self.push_error(index, feature, kind, message, Some("geometry".to_string()), None);
        }

        if feature.id.is_none() {
            self.missing_id_count += 1;
            self.push_warning(
                index,
                feature,
                "missing_identity".to_string(),
                "feature has no stable id; one was auto-generated".to_string(),
                Some("id".to_string()),
                Some("set `id`, `properties.id`, or `properties.feature_id` upstream".to_string()),
            );
        }

        if !has_data_source(feature) {
            self.missing_data_source_count += 1;
            self.push_warning(
                index,
                feature,
                "missing_data_source".to_string(),
                "feature has no properties.dataSource; the version's default will be substituted at publish time".to_string(),
                Some("properties.dataSource".to_string()),
                Some("set properties.dataSource upstream to avoid relying on the version default".to_string()),
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_error(
        &mut self,
        index: usize,
        feature: &RawFeature,
        kind: String,
        message: String,
        field: Option<String>,
        hint: Option<String>,
    ) {
        self.error_count += 1;
        if self.errors.len() < self.max_errors_retained {
            self.errors.push(ValidationError {
                feature_index: index,
                feature_id: feature.id.clone(),
                kind,
                message,
                field,
                hint,
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_warning(
        &mut self,
        index: usize,
        feature: &RawFeature,
        kind: String,
        message: String,
        field: Option<String>,
        hint: Option<String>,
    ) {
        self.warning_count += 1;
        if self.warnings.len() < self.max_errors_retained {
            self.warnings.push(ValidationError {
                feature_index: index,
                feature_id: feature.id.clone(),
                kind,
                message,
                field,
                hint,
            });
        }
    }

    pub fn finish(self) -> ValidationResult {
        ValidationResult {
            feature_count: self.feature_count,
            error_count: self.error_count,
            warning_count: self.warning_count,
            missing_id_count: self.missing_id_count,
            missing_data_source_count: self.missing_data_source_count,
            geometry_types: self.geometry_types.into_iter().collect(),
            passed: self.error_count == 0,
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

pub fn validate_all(config: &ValidationConfig, features: &[RawFeature]) -> AppResult<ValidationResult> {
    let mut validator = Validator::new(config);
    for (index, feature) in features.iter().enumerate() {
        validator.feed(index, feature);
    }
    Ok(validator.finish())
}

fn has_data_source(feature: &RawFeature) -> bool {
    feature
        .properties
        .get("dataSource")
        .map(|v| !v.is_null())
        .unwrap_or(false)
}

fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

fn check_geometry(geometry: &Geometry<f64>, epsilon: f64) -> Result<(), (String, String)> {
    let rect = geometry
        .bounding_rect()
        .ok_or_else(|| ("empty_geometry".to_string(), "geometry has no extent".to_string()))?;

    let width = (rect.max().x - rect.min().x).abs();
    let height = (rect.max().y - rect.min().y).abs();
    if width < epsilon && height < epsilon {
        return Err((
            "degenerate_geometry".to_string(),
            "geometry collapses to a point within the configured tolerance".to_string(),
        ));
    }

    if let Geometry::Polygon(poly) = geometry {
        if poly.exterior().is_cw() {
            return Err((
                "invalid_ring_winding".to_string(),
                "exterior ring is wound clockwise".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{LineString, Point};

    fn config() -> ValidationConfig {
        ValidationConfig {
            epsilon_geom: 1e-7,
            max_errors_retained: 10,
        }
    }

    fn feature(id: Option<&str>, geometry: Geometry<f64>) -> RawFeature {
        RawFeature {
            id: id.map(|s| s.to_string()),
            geometry,
            properties: serde_json::Value::Object(Default::default()),
        }
    }

    fn feature_with_properties(id: Option<&str>, geometry: Geometry<f64>, properties: serde_json::Value) -> RawFeature {
        RawFeature {
            id: id.map(|s| s.to_string()),
            geometry,
            properties,
        }
    }

    #[test]
    fn test_valid_linestring_passes() {
        let f = feature(
            Some("r1"),
            Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)])),
        );
        let result = validate_all(&config(), &[f]).unwrap();
        assert!(result.passed);
        assert_eq!(result.error_count, 0);
        assert_eq!(result.geometry_types, vec!["LineString".to_string()]);
    }

    #[test]
    fn test_degenerate_point_geometry_fails() {
        let f = feature(Some("r1"), Geometry::Point(Point::new(1.0, 1.0)));
        let result = validate_all(&config(), &[f]).unwrap();
        assert!(!result.passed);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.errors[0].kind, "degenerate_geometry");
    }

    #[test]
    fn test_missing_id_is_a_warning_not_an_error() {
        let f = feature(
            None,
            Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)])),
        );
        let result = validate_all(&config(), &[f]).unwrap();
        assert!(result.passed);
        assert_eq!(result.warning_count, 1);
        assert_eq!(result.missing_id_count, 1);
    }

    #[test]
    fn test_missing_data_source_is_counted() {
        let f = feature(
            Some("r1"),
            Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)])),
        );
        let result = validate_all(&config(), &[f]).unwrap();
        assert_eq!(result.missing_data_source_count, 1);
    }

    #[test]
    fn test_present_data_source_is_not_counted() {
        let f = feature_with_properties(
            Some("r1"),
            Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)])),
            serde_json::json!({"dataSource": "manual"}),
        );
        let result = validate_all(&config(), &[f]).unwrap();
        assert_eq!(result.missing_data_source_count, 0);
    }

    #[test]
    fn test_error_truncation_respects_max_errors_retained() {
        let cfg = ValidationConfig {
            epsilon_geom: 1e-7,
            max_errors_retained: 1,
        };
        let features: Vec<RawFeature> = (0..5)
            .map(|_| feature(Some("r"), Geometry::Point(Point::new(1.0, 1.0))))
            .collect();

        let result = validate_all(&cfg, &features).unwrap();
        assert_eq!(result.error_count, 5);
        assert_eq!(result.errors.len(), 1);
    }
}
