use crate::blob_store::{BlobKind, BlobStore};
use crate::database::DbPool;
use crate::diff::{self, Comparison, ImportScope};
use crate::error::{AppError, AppResult};
use crate::models::{DiffMode, DiffResult};
use crate::publisher::{apply_change_set, RoadSnapshotEntry};
use crate::version_store;

/// Rolls back to the live state right after an archived version `V_t` was
/// published. `V_t` itself stays `archived` and untouched — it is a restore
/// point, not the thing being mutated. The version currently `published`
/// (whatever superseded `V_t`, directly or through a chain of publishes)
/// becomes `rolledBack`, a terminal state distinct from ordinary
/// supersession by a later publish. A brand-new version is created and
/// published with the restored feature set, carrying its own fresh
/// pre-rollback snapshot so a later rollback can still reconcile past it.
///
/// `V_t.snapshotRef` is `V_t`'s own *pre-publish* snapshot — the state right
/// before `V_t` itself went live — so it cannot be used directly here. The
/// state right after `V_t` published is, by construction, the pre-publish
/// snapshot of whichever version `V_t.supersededByVersionId` points at:
/// that version's publish captured the live set immediately before its own
/// changes were applied, which is exactly the moment `V_t`'s changes had
/// just finished landing.
///
/// Shares `apply_change_set` with the publisher so "reconcile live state
/// against a target set" is implemented exactly once.
pub async fn rollback(
    pool: &DbPool,
    blob_store: &BlobStore,
    target_version_id: i64,
    epsilon_geom: f64,
) -> AppResult<i64> {
    let _guard = crate::publisher::acquire_lock();

    let target = {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || -> AppResult<crate::models::ImportVersion> {
            let conn = pool.get().map_err(AppError::Pool)?;
            version_store::require_version(&conn, target_version_id)
        })
        .await
        .map_err(|e| AppError::Internal(format!("rollback task panicked: {}", e)))??
    };

    if target.status != "archived" {
        return Err(AppError::InvalidTransition(format!(
            "version {} must be archived with a snapshot to be a rollback target",
            target_version_id
        )));
    }

    let successor_id = target.superseded_by_version_id.ok_or_else(|| {
        AppError::IntegrityViolation(format!(
            "archived version {} has no recorded successor to recover its post-publish state from",
            target_version_id
        ))
    })?;

    let successor = {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || -> AppResult<crate::models::ImportVersion> {
            let conn = pool.get().map_err(AppError::Pool)?;
            version_store::require_version(&conn, successor_id)
        })
        .await
        .map_err(|e| AppError::Internal(format!("rollback task panicked: {}", e)))??
    };

    let snapshot_hash = successor.snapshot_blob_hash.clone().ok_or_else(|| {
        AppError::IntegrityViolation(format!("version {} has no pre-publish snapshot", successor_id))
    })?;

    let snapshot_bytes = blob_store.open(BlobKind::Snapshot, &snapshot_hash).await?;
    let restore_target: Vec<RoadSnapshotEntry> = serde_json::from_slice(&snapshot_bytes)
        .map_err(|e| AppError::IntegrityViolation(format!("corrupt snapshot blob: {}", e)))?;

    let pool = pool.clone();
    let (new_snapshot_json, diff_result, new_version_id, superseded_id) = tokio::task::spawn_blocking({
        let target = target.clone();
        move || -> AppResult<(String, DiffResult, i64, i64)> {
            let conn = pool.get().map_err(AppError::Pool)?;

            let superseded = version_store::get_published(&conn)?
                .ok_or_else(|| AppError::IntegrityViolation("no version is currently published to roll back".to_string()))?;

            let comparison = Comparison::Bbox(ImportScope::Full);
            let (live_rows, content) = diff::resolve_current(&conn, &comparison)?;
            let new_snapshot_json = serde_json::to_string(
                &live_rows
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
                    .collect::<Vec<_>>(),
            )?;

            let new_version_id = version_store::create_draft(
                &conn,
                &target.source_filename,
                &target.source_format,
                restore_target.len() as i64,
                &target.upload_blob_hash,
                None,
            )?;
            version_store::configure_draft(
                &conn,
                new_version_id,
                target.source_layer.as_deref().unwrap_or(""),
                target.crs.as_deref().unwrap_or("WGS84"),
                &target.default_data_source,
                target.regional_refresh,
                target.scope.as_deref(),
                None,
            )?;

            let diff_result = apply_change_set(
                &conn,
                new_version_id,
                &live_rows,
                &content,
                DiffMode::RegionalRefresh,
                &restore_target,
                epsilon_geom,
            )?;

            Ok((new_snapshot_json, diff_result, new_version_id, superseded.id))
        }
    })
    .await
    .map_err(|e| AppError::Internal(format!("rollback task panicked: {}", e)))??;

    let new_snapshot_hash = blob_store.put(BlobKind::Snapshot, new_snapshot_json.as_bytes()).await?;
    let diff_json = serde_json::to_string(&diff_result)?;
    let diff_hash = blob_store.put(BlobKind::Diff, diff_json.as_bytes()).await?;
    let (added_count, updated_count, removed_count) = (diff_result.added, diff_result.updated, diff_result.removed);

    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> AppResult<()> {
        let conn = pool.get().map_err(AppError::Pool)?;
        version_store::mark_rolled_back(&conn, superseded_id, new_version_id)?;
        version_store::mark_published(
            &conn,
            new_version_id,
            &new_snapshot_hash,
            &diff_hash,
            added_count,
            updated_count,
            removed_count,
        )?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Internal(format!("rollback finalize task panicked: {}", e)))??;

    Ok(new_version_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::publish;
    use crate::road_store;
    use crate::test_utils::{create_test_db, seed_draft_version};

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

    async fn configure_and_publish(pool: &DbPool, blob_store: &BlobStore, filename: &str, entries: Vec<RoadSnapshotEntry>) -> i64 {
        let version_id = seed_draft_version(pool, filename, "geojson");
        {
            let conn = pool.get().unwrap();
            version_store::configure_draft(&conn, version_id, "default", "WGS84", "official_ledger", true, Some("full"), None).unwrap();
        }
        pass_validation(pool, version_id);
        publish(pool, blob_store, version_id, entries, 1e-7).await.unwrap();
        version_id
    }

    #[tokio::test]
    async fn test_rollback_restores_target_state_and_supersedes_chain() {
        let pool = create_test_db();
        let blob_store = BlobStore::new(std::env::temp_dir().join("roadnet-rollback-test-1"));

        // V1: publish r1.
        let v1 = configure_and_publish(&pool, &blob_store, "a.geojson", vec![entry("r1")]).await;
        // V2: publish r1 + r2, which archives V1.
        let v2 = configure_and_publish(&pool, &blob_store, "b.geojson", vec![entry("r1"), entry("r2")]).await;

        {
            let conn = pool.get().unwrap();
            assert_eq!(version_store::require_version(&conn, v1).unwrap().status, "archived");
            assert_eq!(version_store::require_version(&conn, v2).unwrap().status, "published");
        }

        // Rolling back to V1 restores the live state right after V1 was
        // published: r1 active, r2 absent (r2 only ever existed from V2 on).
        let v3 = rollback(&pool, &blob_store, v1, 1e-7).await.unwrap();

        let conn = pool.get().unwrap();
        assert_eq!(version_store::require_version(&conn, v1).unwrap().status, "archived", "rollback target stays archived");
        assert_eq!(version_store::require_version(&conn, v2).unwrap().status, "rolled_back", "previously-published version is rolled back, not the target");
        assert_eq!(version_store::require_version(&conn, v3).unwrap().status, "published");

        assert!(road_store::get_active(&conn, "r1").unwrap().is_some(), "r1 was live right after V1 published");
        assert!(road_store::get_active(&conn, "r2").unwrap().is_none(), "r2 did not exist until V2");
    }

    #[tokio::test]
    async fn test_second_rollback_against_already_rolled_back_target_fails() {
        let pool = create_test_db();
        let blob_store = BlobStore::new(std::env::temp_dir().join("roadnet-rollback-test-2"));

        let v1 = configure_and_publish(&pool, &blob_store, "a.geojson", vec![entry("r1")]).await;
        let v2 = configure_and_publish(&pool, &blob_store, "b.geojson", vec![entry("r1"), entry("r2")]).await;
        rollback(&pool, &blob_store, v1, 1e-7).await.unwrap();

        // v2 is now rolled_back (terminal); targeting it again must fail.
        let result = rollback(&pool, &blob_store, v2, 1e-7).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rollback_rejects_draft_target() {
        let pool = create_test_db();
        let blob_store = BlobStore::new(std::env::temp_dir().join("roadnet-rollback-test-3"));
        let version_id = seed_draft_version(&pool, "a.geojson", "geojson");

        let result = rollback(&pool, &blob_store, version_id, 1e-7).await;
        assert!(result.is_err());
    }
}
