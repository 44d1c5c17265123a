use crate::database::DbConn;
use crate::error::{AppError, AppResult};
use crate::models::{DiffMode, DiffResult, FeatureDiff};
use crate::publisher::RoadSnapshotEntry;
use crate::road_store;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy)]
pub enum ImportScope {
    Full,
    Ward(String),
    Bbox {
        min_lng: f64,
        min_lat: f64,
        max_lng: f64,
        max_lat: f64,
    },
}

impl ImportScope {
    /// Parses the persisted scope string: `"full"`, `"ward:<name>"`, or
    /// `"bbox:minLng,minLat,maxLng,maxLat"`.
    pub fn parse(scope: &str) -> AppResult<Self> {
        if scope == "full" {
            return Ok(Self::Full);
        }

        if let Some(name) = scope.strip_prefix("ward:") {
            if name.is_empty() {
                return Err(AppError::InvalidScope("ward scope requires a name".to_string()));
            }
            return Ok(Self::Ward(name.to_string()));
        }

        let rest = scope
            .strip_prefix("bbox:")
            .ok_or_else(|| AppError::InvalidScope(format!("unrecognized scope: {}", scope)))?;

        let parts: Vec<&str> = rest.split(',').collect();
        if parts.len() != 4 {
            return Err(AppError::InvalidScope(format!(
                "bbox scope requires 4 components, got {}",
                parts.len()
            )));
        }

        let values: AppResult<Vec<f64>> = parts
            .iter()
            .map(|p| {
                p.trim()
                    .parse::<f64>()
                    .map_err(|_| AppError::InvalidScope(format!("invalid number in scope: {}", p)))
            })
            .collect();
        let values = values?;

        let (min_lng, min_lat, max_lng, max_lat) = (values[0], values[1], values[2], values[3]);
        if min_lng > max_lng || min_lat > max_lat {
            return Err(AppError::InvalidScope(
                "bbox min must not exceed max".to_string(),
            ));
        }

        Ok(Self::Bbox {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        })
    }
}

/// What the incoming feature set is compared against. `Bbox` (which covers
/// both `full` and `bbox:` scopes) compares against whatever is live right
/// now. `Precise` compares against the stored export the draft's
/// `sourceExportId` points at instead, so a drifted live database doesn't
/// manufacture spurious diffs for identities the export never claimed.
pub enum Comparison<'a> {
    Bbox(ImportScope),
    Precise(&'a [RoadSnapshotEntry]),
}

pub type ContentMap = HashMap<String, (String, String)>;

/// Resolves a comparison into the live rows a publish would actually
/// mutate, plus the content (geometry, properties) each identity should be
/// compared against. For `Precise`, baseline content wins for identities
/// the export knows about; any live road the export never claimed is
/// still surfaced (under its real content) so it remains visible as a
/// deactivation candidate.
pub fn resolve_current(
    conn: &DbConn,
    comparison: &Comparison<'_>,
) -> AppResult<(HashMap<String, crate::models::Road>, ContentMap)> {
    let live_rows: HashMap<String, crate::models::Road> = match comparison {
        Comparison::Bbox(ImportScope::Full) | Comparison::Precise(_) => road_store::active_all(conn)?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect(),
        Comparison::Bbox(ImportScope::Bbox {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        }) => road_store::active_in_bbox(conn, *min_lng, *max_lng, *min_lat, *max_lat)?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect(),
        Comparison::Bbox(ImportScope::Ward(name)) => road_store::active_by_ward(conn, name)?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect(),
    };

    let content: ContentMap = match comparison {
        Comparison::Bbox(_) => live_rows
            .iter()
            .map(|(id, r)| (id.clone(), (r.geometry.to_string(), r.properties.to_string())))
            .collect(),
        Comparison::Precise(baseline) => {
            let mut content: ContentMap = baseline
                .iter()
                .map(|e| (e.id.clone(), (e.geometry_json.clone(), e.properties_json.clone())))
                .collect();
            for (id, row) in &live_rows {
                content
                    .entry(id.clone())
                    .or_insert_with(|| (row.geometry.to_string(), row.properties.to_string()));
            }
            content
        }
    };

    Ok((live_rows, content))
}

/// Geometry equality under a tolerance: numeric ordinates (coordinates)
/// compare within `epsilon`, everything else (ring/array structure, object
/// keys) compares exactly. Falls back to exact string equality if either
/// side fails to parse as JSON, which should never happen for geometry this
/// system produced itself.
pub fn geometry_equal(a: &str, b: &str, epsilon: f64) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(a),
        serde_json::from_str::<serde_json::Value>(b),
    ) {
        (Ok(av), Ok(bv)) => json_value_equal_within(&av, &bv, epsilon),
        _ => a == b,
    }
}

fn json_value_equal_within(a: &serde_json::Value, b: &serde_json::Value, epsilon: f64) -> bool {
    use serde_json::Value;
    match (a, b) {
        (Value::Number(an), Value::Number(bn)) => match (an.as_f64(), bn.as_f64()) {
            (Some(af), Some(bf)) => (af - bf).abs() <= epsilon,
            _ => an == bn,
        },
        (Value::Array(aa), Value::Array(ba)) => {
            aa.len() == ba.len() && aa.iter().zip(ba).all(|(x, y)| json_value_equal_within(x, y, epsilon))
        }
        (Value::Object(ao), Value::Object(bo)) => {
            ao.len() == bo.len()
                && ao
                    .iter()
                    .all(|(k, v)| bo.get(k).is_some_and(|bv| json_value_equal_within(v, bv, epsilon)))
        }
        _ => a == b,
    }
}

/// Classifies an incoming feature set against an already-resolved content
/// map. Shared by `compute` (ephemeral preview) and the publisher's actual
/// reconciliation, so both agree on what counts as added/updated/removed.
/// Geometry equality is tolerance-based (`epsilon_geom`); attribute
/// equality is exact.
pub fn classify(
    content: &ContentMap,
    mode: DiffMode,
    incoming: &[(String, String, String)],
    epsilon_geom: f64,
) -> DiffResult {
    let mut result = DiffResult::empty();
    let mut seen: HashSet<String> = HashSet::new();

    for (id, geometry_json, properties_json) in incoming {
        seen.insert(id.clone());

        match content.get(id) {
            None => {
                result.added += 1;
                result.changes.push(FeatureDiff {
                    road_id: id.clone(),
                    classification: "added".to_string(),
                });
            }
            Some((existing_geometry, existing_properties)) => {
                let unchanged = geometry_equal(existing_geometry, geometry_json, epsilon_geom)
                    && existing_properties == properties_json;
                if unchanged {
                    result.unchanged += 1;
                } else {
                    result.updated += 1;
                    result.changes.push(FeatureDiff {
                        road_id: id.clone(),
                        classification: "updated".to_string(),
                    });
                }
            }
        }
    }

    if mode == DiffMode::RegionalRefresh {
        for id in content.keys() {
            if !seen.contains(id) {
                result.removed += 1;
                result.changes.push(FeatureDiff {
                    road_id: id.clone(),
                    classification: "removed".to_string(),
                });
            }
        }
    }

    result
}

/// Ephemeral diff preview for a draft: resolves the comparison and
/// classifies, without mutating anything.
pub fn compute(
    conn: &DbConn,
    comparison: &Comparison<'_>,
    mode: DiffMode,
    incoming: &[(String, String, String)],
    epsilon_geom: f64,
) -> AppResult<DiffResult> {
    let (_, content) = resolve_current(conn, comparison)?;
    Ok(classify(&content, mode, incoming, epsilon_geom))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road_store::{self, NewRoad};
    use crate::test_utils::create_test_conn;

    fn seed_version(conn: &DbConn) {
        conn.execute(
            "INSERT INTO import_versions (version_number, status, source_filename, source_format, upload_blob_hash, created_at) VALUES (1, 'published', 'a.geojson', 'geojson', 'h', datetime('now'))",
            [],
        )
        .unwrap();
    }

    fn bbox_covering_world() -> ImportScope {
        ImportScope::Bbox {
            min_lng: -1.0,
            min_lat: -1.0,
            max_lng: 2.0,
            max_lat: 2.0,
        }
    }

    #[test]
    fn test_geometry_equal_tolerates_sub_epsilon_noise() {
        let a = r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#;
        let b = r#"{"type":"LineString","coordinates":[[0.00000001,0],[1,1]]}"#;
        assert!(geometry_equal(a, b, 1e-7));
    }

    #[test]
    fn test_geometry_equal_rejects_difference_beyond_epsilon() {
        let a = r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#;
        let b = r#"{"type":"LineString","coordinates":[[0.01,0],[1,1]]}"#;
        assert!(!geometry_equal(a, b, 1e-7));
    }

    #[test]
    fn test_parse_full_scope() {
        assert!(matches!(ImportScope::parse("full").unwrap(), ImportScope::Full));
    }

    #[test]
    fn test_parse_bbox_scope() {
        let scope = ImportScope::parse("bbox:-74.1,40.7,-74.0,40.8").unwrap();
        let ImportScope::Bbox { min_lng, min_lat, max_lng, max_lat } = scope else {
            panic!("expected bbox scope");
        };
        assert_eq!(min_lng, -74.1);
        assert_eq!(max_lat, 40.8);
        let _ = (min_lat, max_lng);
    }

    #[test]
    fn test_parse_rejects_malformed_scope() {
        assert!(ImportScope::parse("bbox:1,2,3").is_err());
        assert!(ImportScope::parse("nonsense").is_err());
    }

    #[test]
    fn test_parse_ward_scope() {
        assert!(matches!(ImportScope::parse("ward:shibuya").unwrap(), ImportScope::Ward(name) if name == "shibuya"));
    }

    #[test]
    fn test_parse_rejects_empty_ward_name() {
        assert!(ImportScope::parse("ward:").is_err());
    }

    #[test]
    fn test_ward_scope_filters_by_properties_ward_attribute() {
        let conn = create_test_conn();
        seed_version(&conn);
        road_store::insert(
            &conn,
            &NewRoad {
                id: "r1",
                version_id: 1,
                geometry_json: r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#,
                properties_json: r#"{"ward":"shibuya"}"#,
                data_source: "official_ledger",
                min_lng: 0.0,
                min_lat: 0.0,
                max_lng: 1.0,
                max_lat: 1.0,
            },
        )
        .unwrap();
        road_store::insert(
            &conn,
            &NewRoad {
                id: "r2",
                version_id: 1,
                geometry_json: r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#,
                properties_json: r#"{"ward":"minato"}"#,
                data_source: "official_ledger",
                min_lng: 0.0,
                min_lat: 0.0,
                max_lng: 1.0,
                max_lat: 1.0,
            },
        )
        .unwrap();

        let comparison = Comparison::Bbox(ImportScope::Ward("shibuya".to_string()));
        let (live_rows, _) = resolve_current(&conn, &comparison).unwrap();
        assert_eq!(live_rows.len(), 1);
        assert!(live_rows.contains_key("r1"));
    }

    #[test]
    fn test_parse_rejects_inverted_bbox() {
        assert!(ImportScope::parse("bbox:10,10,0,0").is_err());
    }

    #[test]
    fn test_incremental_never_removes() {
        let conn = create_test_conn();
        seed_version(&conn);
        road_store::insert(
            &conn,
            &NewRoad {
                id: "r1",
                version_id: 1,
                geometry_json: r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#,
                properties_json: "{}",
                data_source: "official_ledger",
                min_lng: 0.0,
                min_lat: 0.0,
                max_lng: 1.0,
                max_lat: 1.0,
            },
        )
        .unwrap();

        let comparison = Comparison::Bbox(bbox_covering_world());
        let result = compute(&conn, &comparison, DiffMode::Incremental, &[], 1e-7).unwrap();
        assert_eq!(result.removed, 0);
    }

    #[test]
    fn test_regional_refresh_removes_roads_absent_from_incoming() {
        let conn = create_test_conn();
        seed_version(&conn);
        road_store::insert(
            &conn,
            &NewRoad {
                id: "r1",
                version_id: 1,
                geometry_json: r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#,
                properties_json: "{}",
                data_source: "official_ledger",
                min_lng: 0.0,
                min_lat: 0.0,
                max_lng: 1.0,
                max_lat: 1.0,
            },
        )
        .unwrap();

        let comparison = Comparison::Bbox(bbox_covering_world());
        let result = compute(&conn, &comparison, DiffMode::RegionalRefresh, &[], 1e-7).unwrap();
        assert_eq!(result.removed, 1);
    }

    #[test]
    fn test_new_feature_is_added() {
        let conn = create_test_conn();
        seed_version(&conn);
        let comparison = Comparison::Bbox(bbox_covering_world());

        let incoming = vec![(
            "r1".to_string(),
            r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#.to_string(),
            "{}".to_string(),
        )];

        let result = compute(&conn, &comparison, DiffMode::Incremental, &incoming, 1e-7).unwrap();
        assert_eq!(result.added, 1);
        assert_eq!(result.unchanged, 0);
    }

    #[test]
    fn test_precise_mode_compares_against_baseline_not_live_drift() {
        let conn = create_test_conn();
        seed_version(&conn);
        // Live has drifted from the export: r1 now has different content
        // than what was exported, and r2 exists live but was never part of
        // the export at all.
        road_store::insert(
            &conn,
            &NewRoad {
                id: "r1",
                version_id: 1,
                geometry_json: r#"{"type":"LineString","coordinates":[[9,9],[9,9]]}"#,
                properties_json: "{}",
                data_source: "official_ledger",
                min_lng: 9.0,
                min_lat: 9.0,
                max_lng: 9.0,
                max_lat: 9.0,
            },
        )
        .unwrap();
        road_store::insert(
            &conn,
            &NewRoad {
                id: "r2",
                version_id: 1,
                geometry_json: r#"{"type":"LineString","coordinates":[[5,5],[5,5]]}"#,
                properties_json: "{}",
                data_source: "official_ledger",
                min_lng: 5.0,
                min_lat: 5.0,
                max_lng: 5.0,
                max_lat: 5.0,
            },
        )
        .unwrap();

        let baseline = vec![RoadSnapshotEntry {
            id: "r1".to_string(),
            geometry_json: r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#.to_string(),
            properties_json: "{}".to_string(),
            data_source: "official_ledger".to_string(),
            min_lng: 0.0,
            min_lat: 0.0,
            max_lng: 1.0,
            max_lat: 1.0,
        }];

        let incoming = vec![(
            "r1".to_string(),
            r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#.to_string(),
            "{}".to_string(),
        )];

        let comparison = Comparison::Precise(&baseline);
        let result = compute(&conn, &comparison, DiffMode::RegionalRefresh, &incoming, 1e-7).unwrap();
        assert_eq!(result.unchanged, 1, "import identical to the export is unchanged, ignoring live drift");
        assert_eq!(result.removed, 1, "r2 never appeared in the export, so it's still a removal candidate");
    }
}
