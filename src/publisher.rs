use crate::blob_store::{BlobKind, BlobStore};
use crate::database::DbPool;
use crate::diff::{self, Comparison, ImportScope};
use crate::error::{AppError, AppResult};
use crate::models::DiffMode;
use crate::models::DiffResult;
use crate::road_store::{self, NewRoad};
use crate::version_store;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A single in-process advisory lock serializing every publish/rollback,
/// matching the single-primary-store assumption this system is built on
/// (see the concurrency Non-goals). A distributed deployment would need a
/// real distributed lock here instead.
static PUBLISH_LOCK: Mutex<()> = Mutex::new(());

/// Rollback shares this same advisory lock so a publish and a rollback can
/// never race against each other.
pub fn acquire_lock() -> std::sync::MutexGuard<'static, ()> {
    PUBLISH_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadSnapshotEntry {
    pub id: String,
    pub geometry_json: String,
    pub properties_json: String,
    pub data_source: String,
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

/// Reconciles live roads to exactly match `target`: entries present in
/// `target` but not live are inserted, entries present in both but
/// differing are updated (archiving the prior geometry to history first),
/// entries live but absent from `target` are deactivated (only when
/// `mode` is `RegionalRefresh`). `live_rows`/`content` come from
/// `diff::resolve_current`, so publish and rollback see the exact same
/// resolved comparison this reconciliation is reported against.
pub fn apply_change_set(
    conn: &crate::database::DbConn,
    version_id: i64,
    live_rows: &std::collections::HashMap<String, crate::models::Road>,
    content: &diff::ContentMap,
    mode: DiffMode,
    target: &[RoadSnapshotEntry],
    epsilon_geom: f64,
) -> AppResult<DiffResult> {
    let target_by_id: std::collections::HashMap<&str, &RoadSnapshotEntry> =
        target.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut result = DiffResult::empty();

    for entry in target {
        let new_road = NewRoad {
            id: &entry.id,
            version_id,
            geometry_json: &entry.geometry_json,
            properties_json: &entry.properties_json,
            data_source: &entry.data_source,
            min_lng: entry.min_lng,
            min_lat: entry.min_lat,
            max_lng: entry.max_lng,
            max_lat: entry.max_lat,
        };

        match content.get(&entry.id) {
            None => {
                road_store::insert(conn, &new_road)?;
                result.added += 1;
            }
            Some((existing_geometry, existing_properties)) => {
                let unchanged = diff::geometry_equal(existing_geometry, &entry.geometry_json, epsilon_geom)
                    && existing_properties == &entry.properties_json;

                if unchanged {
                    result.unchanged += 1;
                } else {
                    if let Some(existing) = live_rows.get(&entry.id) {
                        road_store::archive_to_history(
                            conn,
                            &existing.id,
                            existing.version_id,
                            &existing.geometry.to_string(),
                            &existing.properties.to_string(),
                            &existing.valid_from,
                        )?;
                        road_store::update_geometry(conn, &new_road)?;
                    } else {
                        // Known to the comparison's baseline but never actually
                        // persisted live (e.g. a Precise export entry the DB
                        // never saw): nothing to archive, so insert fresh.
                        road_store::insert(conn, &new_road)?;
                    }
                    result.updated += 1;
                }
            }
        }
    }

    if mode == DiffMode::RegionalRefresh {
        for id in content.keys() {
            if !target_by_id.contains_key(id.as_str()) {
                if let Some(existing) = live_rows.get(id) {
                    road_store::archive_to_history(
                        conn,
                        &existing.id,
                        existing.version_id,
                        &existing.geometry.to_string(),
                        &existing.properties.to_string(),
                        &existing.valid_from,
                    )?;
                    road_store::deactivate(conn, id, None)?;
                    result.removed += 1;
                }
            }
        }
    }

    Ok(result)
}

fn snapshot_live_rows(
    live_rows: &std::collections::HashMap<String, crate::models::Road>,
) -> Vec<RoadSnapshotEntry> {
    live_rows
        .values()
        .map(|r| RoadSnapshotEntry {
            id: r.id.clone(),
            geometry_json: r.geometry.to_string(),
            properties_json: r.properties.to_string(),
            data_source: r.data_source.clone(),
            min_lng: r.min_lng,
            min_lat: r.min_lat,
            max_lng: r.max_lng,
            max_lat: r.max_lat,
        })
        .collect()
}

/// Resolves a configured draft's comparison mode: `Precise` when a
/// `sourceExportId` baseline is configured (its bytes are loaded by the
/// caller, since blob reads are async and this runs inside
/// `spawn_blocking`), `Bbox`/`Full` otherwise per the draft's `scope`.
pub fn comparison_for<'a>(
    source_export_id: Option<&str>,
    baseline: &'a Option<Vec<RoadSnapshotEntry>>,
    scope: Option<&str>,
) -> AppResult<Comparison<'a>> {
    if source_export_id.is_some() {
        let baseline = baseline
            .as_ref()
            .ok_or_else(|| AppError::IntegrityViolation("source export baseline was not loaded".to_string()))?;
        return Ok(Comparison::Precise(baseline));
    }

    let scope_str = scope.ok_or_else(|| AppError::InvalidScope("version has no configured scope".to_string()))?;
    Ok(Comparison::Bbox(ImportScope::parse(scope_str)?))
}

/// Publishes a draft: takes the advisory lock, checks it is a draft with a
/// passing validation result, reconciles live roads to the incoming
/// feature set, archives whichever version was previously published (if
/// any), and records the pre-publish snapshot + historical diff before
/// flipping the draft to `published`.
pub async fn publish(
    pool: &DbPool,
    blob_store: &BlobStore,
    version_id: i64,
    incoming: Vec<RoadSnapshotEntry>,
    epsilon_geom: f64,
) -> AppResult<DiffResult> {
    let _guard = acquire_lock();

    let version = {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || -> AppResult<crate::models::ImportVersion> {
            let conn = pool.get().map_err(AppError::Pool)?;
            version_store::require_version(&conn, version_id)
        })
        .await
        .map_err(|e| AppError::Internal(format!("publish task panicked: {}", e)))??
    };

    if version.status != "draft" {
        return Err(AppError::InvalidTransition(format!(
            "version {} must be a draft to publish",
            version_id
        )));
    }

    let baseline = match &version.source_export_id {
        Some(hash) => {
            let bytes = blob_store.open(BlobKind::Snapshot, hash).await?;
            let entries: Vec<RoadSnapshotEntry> = serde_json::from_slice(&bytes)
                .map_err(|e| AppError::IntegrityViolation(format!("corrupt source export blob: {}", e)))?;
            Some(entries)
        }
        None => None,
    };

    let mode = if version.regional_refresh {
        DiffMode::RegionalRefresh
    } else {
        DiffMode::Incremental
    };

    let pool = pool.clone();
    let (snapshot_json, diff_result, previously_published_id) = tokio::task::spawn_blocking(move || -> AppResult<(String, DiffResult, Option<i64>)> {
        let conn = pool.get().map_err(AppError::Pool)?;

        let latest_validation = version_store::get_latest_job(&conn, version_id, "validate")?
            .ok_or_else(|| AppError::ValidationBlocked(format!("version {} has not been validated", version_id)))?;
        if latest_validation.status != "completed" {
            return Err(AppError::ValidationBlocked(format!(
                "version {} validation is not complete",
                version_id
            )));
        }
        let validation_result = version_store::get_validation_result(&conn, latest_validation.id)?
            .ok_or_else(|| AppError::ValidationBlocked(format!("version {} has no validation result", version_id)))?;
        if !validation_result.passed {
            return Err(AppError::ValidationBlocked(format!(
                "version {} failed validation",
                version_id
            )));
        }

        let comparison = comparison_for(
            version.source_export_id.as_deref(),
            &baseline,
            version.scope.as_deref(),
        )?;

        let (live_rows, content) = diff::resolve_current(&conn, &comparison)?;
        let pre_publish_snapshot = snapshot_live_rows(&live_rows);
        let snapshot_json = serde_json::to_string(&pre_publish_snapshot)?;

        let diff_result = apply_change_set(&conn, version_id, &live_rows, &content, mode, &incoming, epsilon_geom)?;

        let previously_published_id = version_store::get_published(&conn)?.map(|v| v.id);

        Ok((snapshot_json, diff_result, previously_published_id))
    })
    .await
    .map_err(|e| AppError::Internal(format!("publish task panicked: {}", e)))??;

    let snapshot_hash = blob_store.put(BlobKind::Snapshot, snapshot_json.as_bytes()).await?;
    let diff_json = serde_json::to_string(&diff_result)?;
    let diff_hash = blob_store.put(BlobKind::Diff, diff_json.as_bytes()).await?;

    let (added_count, updated_count, removed_count) = (diff_result.added, diff_result.updated, diff_result.removed);

    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> AppResult<()> {
        let conn = pool.get().map_err(AppError::Pool)?;
        if let Some(previous_id) = previously_published_id {
            version_store::mark_archived(&conn, previous_id, version_id)?;
        }
        version_store::mark_published(
            &conn,
            version_id,
            &snapshot_hash,
            &diff_hash,
            added_count,
            updated_count,
            removed_count,
        )?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Internal(format!("publish finalize task panicked: {}", e)))??;

    Ok(diff_result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_db;

    fn entry(id: &str) -> RoadSnapshotEntry {
        RoadSnapshotEntry {
            id: id.to_string(),
            geometry_json: r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#.to_string(),
            properties_json: "{}".to_string(),
            data_source: "official_ledger".to_string(),
            min_lng: 0.0,
            min_lat: 0.0,
            max_lng: 1.0,
            max_lat: 1.0,
        }
    }

    fn seed_version(pool: &DbPool) -> i64 {
        crate::test_utils::seed_draft_version(pool, "a.geojson", "geojson")
    }

    fn pass_validation(pool: &DbPool, version_id: i64) {
        let conn = pool.get().unwrap();
        let job_id = version_store::create_job(&conn, version_id, "validate", None).unwrap();
        version_store::mark_job_running(&conn, job_id).unwrap();
        version_store::store_validation_result(
            &conn,
            job_id,
            &crate::models::ValidationResult {
                feature_count: 1,
                error_count: 0,
                warning_count: 0,
                missing_id_count: 0,
                missing_data_source_count: 0,
                geometry_types: vec!["LineString".to_string()],
                errors: vec![],
                warnings: vec![],
                passed: true,
            },
        )
        .unwrap();
        version_store::finalize_job_completed(&conn, job_id).unwrap();
    }

    #[tokio::test]
    async fn test_publish_requires_draft_status() {
        let pool = create_test_db();
        let blob_store = BlobStore::new(std::env::temp_dir().join("roadnet-pub-test-1"));
        let version_id = seed_version(&pool);

        {
            let conn = pool.get().unwrap();
            version_store::configure_draft(&conn, version_id, "default", "WGS84", "official_ledger", false, Some("bbox:-1,-1,2,2"), None).unwrap();
        }
        pass_validation(&pool, version_id);
        publish(&pool, &blob_store, version_id, vec![entry("r1")], 1e-7).await.unwrap();

        // now published, republishing must fail
        let result = publish(&pool, &blob_store, version_id, vec![entry("r1")], 1e-7).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_publish_requires_passing_validation() {
        let pool = create_test_db();
        let blob_store = BlobStore::new(std::env::temp_dir().join("roadnet-pub-test-2"));
        let version_id = seed_version(&pool);

        {
            let conn = pool.get().unwrap();
            version_store::configure_draft(&conn, version_id, "default", "WGS84", "official_ledger", false, Some("bbox:-1,-1,2,2"), None).unwrap();
        }

        let result = publish(&pool, &blob_store, version_id, vec![entry("r1")], 1e-7).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_publish_inserts_new_roads_and_archives_previous() {
        let pool = create_test_db();
        let blob_store = BlobStore::new(std::env::temp_dir().join("roadnet-pub-test-3"));
        let v1 = seed_version(&pool);

        {
            let conn = pool.get().unwrap();
            version_store::configure_draft(&conn, v1, "default", "WGS84", "official_ledger", false, Some("bbox:-1,-1,2,2"), None).unwrap();
        }
        pass_validation(&pool, v1);

        let diff = publish(&pool, &blob_store, v1, vec![entry("r1")], 1e-7).await.unwrap();
        assert_eq!(diff.added, 1);

        let conn = pool.get().unwrap();
        let version = version_store::require_version(&conn, v1).unwrap();
        assert_eq!(version.status, "published");
        assert!(version.snapshot_blob_hash.is_some());

        let road = road_store::get_active(&conn, "r1").unwrap().unwrap();
        assert_eq!(road.status, "active");
        drop(conn);

        // a second publish supersedes the first, which should become archived
        let v2 = seed_version(&pool);
        {
            let conn = pool.get().unwrap();
            version_store::configure_draft(&conn, v2, "default", "WGS84", "official_ledger", false, Some("bbox:-1,-1,2,2"), None).unwrap();
        }
        pass_validation(&pool, v2);
        publish(&pool, &blob_store, v2, vec![entry("r1"), entry("r2")], 1e-7).await.unwrap();

        let conn = pool.get().unwrap();
        let v1_after = version_store::require_version(&conn, v1).unwrap();
        assert_eq!(v1_after.status, "archived");
        let v2_after = version_store::require_version(&conn, v2).unwrap();
        assert_eq!(v2_after.status, "published");
    }

    #[test]
    fn test_apply_change_set_is_idempotent_for_unchanged_features() {
        let conn = create_test_db().get().unwrap();
        conn.execute(
            "INSERT INTO import_versions (version_number, status, source_filename, source_format, upload_blob_hash, created_at) VALUES (1, 'draft', 'a.geojson', 'geojson', 'h', datetime('now'))",
            [],
        )
        .unwrap();

        let empty_rows = std::collections::HashMap::new();
        let empty_content = std::collections::HashMap::new();
        apply_change_set(&conn, 1, &empty_rows, &empty_content, DiffMode::Incremental, &[entry("r1")], 1e-7).unwrap();

        let comparison = Comparison::Bbox(ImportScope::Bbox {
            min_lng: -1.0,
            min_lat: -1.0,
            max_lng: 2.0,
            max_lat: 2.0,
        });
        let (live_rows, content) = diff::resolve_current(&conn, &comparison).unwrap();
        let second = apply_change_set(&conn, 1, &live_rows, &content, DiffMode::Incremental, &[entry("r1")], 1e-7).unwrap();

        assert_eq!(second.added, 0);
        assert_eq!(second.unchanged, 1);
    }

    #[test]
    fn test_apply_change_set_tolerates_floating_point_noise_in_geometry() {
        let conn = create_test_db().get().unwrap();
        conn.execute(
            "INSERT INTO import_versions (version_number, status, source_filename, source_format, upload_blob_hash, created_at) VALUES (1, 'draft', 'a.geojson', 'geojson', 'h', datetime('now'))",
            [],
        )
        .unwrap();

        let empty_rows = std::collections::HashMap::new();
        let empty_content = std::collections::HashMap::new();
        apply_change_set(&conn, 1, &empty_rows, &empty_content, DiffMode::Incremental, &[entry("r1")], 1e-7).unwrap();

        let comparison = Comparison::Bbox(ImportScope::Bbox {
            min_lng: -1.0,
            min_lat: -1.0,
            max_lng: 2.0,
            max_lat: 2.0,
        });
        let (live_rows, content) = diff::resolve_current(&conn, &comparison).unwrap();

        let mut noisy = entry("r1");
        noisy.geometry_json = r#"{"type":"LineString","coordinates":[[0.00000001,0],[1,1]]}"#.to_string();
        let second = apply_change_set(&conn, 1, &live_rows, &content, DiffMode::Incremental, &[noisy], 1e-7).unwrap();

        assert_eq!(second.unchanged, 1, "sub-epsilon coordinate noise must not count as an update");
    }
}
