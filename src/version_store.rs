use crate::database::{execute_query, fetch_all, fetch_one, insert_returning_id, queries, DbConn};
use crate::error::{AppError, AppResult};
use crate::models::{ImportJob, ImportVersion, ValidationResult};
use rusqlite::Row;

fn map_version(row: &Row<'_>) -> rusqlite::Result<ImportVersion> {
    Ok(ImportVersion {
        id: row.get(0)?,
        version_number: row.get(1)?,
        status: row.get(2)?,
        source_filename: row.get(3)?,
        source_format: row.get(4)?,
        source_layer: row.get(5)?,
        crs: row.get(6)?,
        scope: row.get(7)?,
        default_data_source: row.get(8)?,
        regional_refresh: row.get::<_, i64>(9)? != 0,
        source_export_id: row.get(10)?,
        feature_count: row.get(11)?,
        upload_blob_hash: row.get(12)?,
        snapshot_blob_hash: row.get(13)?,
        diff_blob_hash: row.get(14)?,
        added_count: row.get(15)?,
        updated_count: row.get(16)?,
        deactivated_count: row.get(17)?,
        created_by: row.get(18)?,
        created_at: row.get(19)?,
        published_at: row.get(20)?,
        archived_at: row.get(21)?,
        rolled_back_at: row.get(22)?,
        superseded_by_version_id: row.get(23)?,
    })
}

fn map_job(row: &Row<'_>) -> rusqlite::Result<ImportJob> {
    Ok(ImportJob {
        id: row.get(0)?,
        version_id: row.get(1)?,
        kind: row.get(2)?,
        status: row.get(3)?,
        progress_processed: row.get(4)?,
        progress_total: row.get(5)?,
        error_message: row.get(6)?,
        triggered_by: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        finished_at: row.get(10)?,
    })
}

pub fn create_draft(
    conn: &DbConn,
    source_filename: &str,
    source_format: &str,
    feature_count: i64,
    upload_blob_hash: &str,
    created_by: Option<&str>,
) -> AppResult<i64> {
    insert_returning_id(
        conn,
        queries::import_versions::INSERT_DRAFT,
        &[
            &source_filename,
            &source_format,
            &feature_count,
            &upload_blob_hash,
            &created_by,
        ],
    )
}

/// Mutates a draft's configuration only; rejects any other status.
/// `scope` is the caller-supplied override (`full` / `ward:<name>` /
/// `bbox:<box>`); when
/// `None` the Diff Engine auto-derives `bbox:<file bbox>` on demand.
#[allow(clippy::too_many_arguments)]
pub fn configure_draft(
    conn: &DbConn,
    version_id: i64,
    layer_name: &str,
    source_crs: &str,
    default_data_source: &str,
    regional_refresh: bool,
    scope: Option<&str>,
    source_export_id: Option<&str>,
) -> AppResult<()> {
    let affected = execute_query(
        conn,
        queries::import_versions::CONFIGURE_DRAFT,
        &[
            &layer_name,
            &source_crs,
            &default_data_source,
            &(regional_refresh as i64),
            &scope,
            &source_export_id,
            &version_id,
        ],
    )?;
    if affected == 0 {
        return Err(AppError::InvalidTransition(
            "version is not in draft status".to_string(),
        ));
    }
    Ok(())
}

pub fn get_version(conn: &DbConn, version_id: i64) -> AppResult<Option<ImportVersion>> {
    fetch_one(conn, queries::import_versions::SELECT_BY_ID, &[&version_id], map_version)
}

pub fn list_versions(conn: &DbConn) -> AppResult<Vec<ImportVersion>> {
    fetch_all(conn, queries::import_versions::SELECT_ALL, &[], map_version)
}

/// Paged, optionally status-filtered listing backing `GET /import/versions`.
/// Returns the page of versions alongside the total matching row count.
pub fn list_versions_page(
    conn: &DbConn,
    status: Option<&str>,
    page: i64,
    page_size: i64,
) -> AppResult<(Vec<ImportVersion>, i64)> {
    let offset = (page.max(1) - 1) * page_size;

    let versions = match status {
        Some(status) => fetch_all(
            conn,
            queries::import_versions::SELECT_PAGE_BY_STATUS,
            &[&status, &page_size, &offset],
            map_version,
        )?,
        None => fetch_all(
            conn,
            queries::import_versions::SELECT_PAGE,
            &[&page_size, &offset],
            map_version,
        )?,
    };

    let total = match status {
        Some(status) => fetch_one(conn, queries::import_versions::COUNT_BY_STATUS, &[&status], |row| {
            row.get::<_, i64>(0)
        })?,
        None => fetch_one(conn, queries::import_versions::COUNT_ALL, &[], |row| row.get::<_, i64>(0))?,
    }
    .unwrap_or(0);

    Ok((versions, total))
}

pub fn get_published(conn: &DbConn) -> AppResult<Option<ImportVersion>> {
    fetch_one(conn, queries::import_versions::SELECT_PUBLISHED, &[], map_version)
}

pub fn require_version(conn: &DbConn, version_id: i64) -> AppResult<ImportVersion> {
    get_version(conn, version_id)?
        .ok_or_else(|| AppError::NotFound(format!("import version {} not found", version_id)))
}

/// Publishes a draft directly (draft -> published), recording the pre-publish
/// snapshot, the historical diff, and the applied change counts.
#[allow(clippy::too_many_arguments)]
pub fn mark_published(
    conn: &DbConn,
    version_id: i64,
    snapshot_blob_hash: &str,
    diff_blob_hash: &str,
    added_count: i64,
    updated_count: i64,
    deactivated_count: i64,
) -> AppResult<()> {
    let affected = execute_query(
        conn,
        queries::import_versions::MARK_PUBLISHED,
        &[
            &snapshot_blob_hash,
            &diff_blob_hash,
            &added_count,
            &updated_count,
            &deactivated_count,
            &version_id,
        ],
    )?;
    if affected == 0 {
        return Err(AppError::InvalidTransition(format!(
            "version {} is not a draft",
            version_id
        )));
    }
    Ok(())
}

/// Supersedes the currently-published version because a new draft replaced
/// it via a normal publish. `superseded_by` is recorded so the superseded
/// version's "state right after I was published" can later be recovered
/// as the superseding version's own pre-publish snapshot.
pub fn mark_archived(conn: &DbConn, version_id: i64, superseded_by: i64) -> AppResult<()> {
    let affected = execute_query(conn, queries::import_versions::MARK_ARCHIVED, &[&superseded_by, &version_id])?;
    if affected == 0 {
        return Err(AppError::InvalidTransition(format!(
            "version {} is not in the expected state for this transition",
            version_id
        )));
    }
    Ok(())
}

/// Supersedes the currently-published version because a rollback replaced
/// it. Terminal: a `rolledBack` version can never again be a rollback
/// target or be restored.
pub fn mark_rolled_back(conn: &DbConn, version_id: i64, superseded_by: i64) -> AppResult<()> {
    let affected = execute_query(conn, queries::import_versions::MARK_ROLLED_BACK, &[&superseded_by, &version_id])?;
    if affected == 0 {
        return Err(AppError::InvalidTransition(format!(
            "version {} is not in the expected state for this transition",
            version_id
        )));
    }
    Ok(())
}

pub fn store_diff_blob(conn: &DbConn, version_id: i64, diff_blob_hash: &str) -> AppResult<()> {
    execute_query(conn, queries::import_versions::STORE_DIFF_BLOB, &[&diff_blob_hash, &version_id])?;
    Ok(())
}

pub fn delete_draft(conn: &DbConn, version_id: i64) -> AppResult<()> {
    let affected = execute_query(conn, queries::import_versions::DELETE_DRAFT, &[&version_id])?;
    if affected == 0 {
        return Err(AppError::InvalidTransition(
            "only draft versions can be deleted".to_string(),
        ));
    }
    Ok(())
}

pub fn create_job(conn: &DbConn, version_id: i64, kind: &str, triggered_by: Option<&str>) -> AppResult<i64> {
    let existing = fetch_all(
        conn,
        queries::import_jobs::SELECT_NON_TERMINAL_FOR_VERSION,
        &[&version_id],
        map_job,
    )?;
    if !existing.is_empty() {
        return Err(AppError::ConflictingJob(format!(
            "version {} already has a running job",
            version_id
        )));
    }

    insert_returning_id(conn, queries::import_jobs::INSERT, &[&version_id, &kind, &triggered_by])
}

pub fn mark_job_running(conn: &DbConn, job_id: i64) -> AppResult<()> {
    execute_query(conn, queries::import_jobs::MARK_RUNNING, &[&job_id])?;
    Ok(())
}

pub fn get_job(conn: &DbConn, job_id: i64) -> AppResult<Option<ImportJob>> {
    fetch_one(conn, queries::import_jobs::SELECT_BY_ID, &[&job_id], map_job)
}

pub fn require_job(conn: &DbConn, job_id: i64) -> AppResult<ImportJob> {
    get_job(conn, job_id)?.ok_or_else(|| AppError::NotFound(format!("job {} not found", job_id)))
}

pub fn get_latest_job(conn: &DbConn, version_id: i64, kind: &str) -> AppResult<Option<ImportJob>> {
    fetch_one(
        conn,
        queries::import_jobs::SELECT_LATEST_BY_VERSION_AND_KIND,
        &[&version_id, &kind],
        map_job,
    )
}

pub fn update_job_progress(conn: &DbConn, job_id: i64, processed: i64, total: Option<i64>) -> AppResult<()> {
    execute_query(conn, queries::import_jobs::UPDATE_PROGRESS, &[&processed, &total, &job_id])?;
    Ok(())
}

pub fn finalize_job_completed(conn: &DbConn, job_id: i64) -> AppResult<()> {
    execute_query(conn, queries::import_jobs::FINALIZE_COMPLETED, &[&job_id])?;
    Ok(())
}

pub fn finalize_job_failed(conn: &DbConn, job_id: i64, message: &str) -> AppResult<()> {
    execute_query(conn, queries::import_jobs::FINALIZE_FAILED, &[&message, &job_id])?;
    Ok(())
}

pub fn store_validation_result(conn: &DbConn, job_id: i64, result: &ValidationResult) -> AppResult<()> {
    let errors_json = serde_json::to_string(&result.errors)?;
    let warnings_json = serde_json::to_string(&result.warnings)?;
    let geometry_types_json = serde_json::to_string(&result.geometry_types)?;
    execute_query(
        conn,
        queries::validation_results::INSERT,
        &[
            &job_id,
            &result.feature_count,
            &result.error_count,
            &result.warning_count,
            &result.missing_id_count,
            &result.missing_data_source_count,
            &geometry_types_json,
            &errors_json,
            &warnings_json,
            &result.passed,
        ],
    )?;
    Ok(())
}

pub fn get_validation_result(conn: &DbConn, job_id: i64) -> AppResult<Option<ValidationResult>> {
    fetch_one(
        conn,
        queries::validation_results::SELECT_BY_JOB_ID,
        &[&job_id],
        |row| {
            let geometry_types_json: String = row.get(7)?;
            let errors_json: String = row.get(8)?;
            let warnings_json: String = row.get(9)?;
            Ok(ValidationResult {
                feature_count: row.get(1)?,
                error_count: row.get(2)?,
                warning_count: row.get(3)?,
                missing_id_count: row.get(4)?,
                missing_data_source_count: row.get(5)?,
                geometry_types: serde_json::from_str(&geometry_types_json).unwrap_or_default(),
                errors: serde_json::from_str(&errors_json).unwrap_or_default(),
                warnings: serde_json::from_str(&warnings_json).unwrap_or_default(),
                passed: row.get::<_, i64>(10)? != 0,
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_conn;

    #[test]
    fn test_create_draft_allocates_version_number_one() {
        let conn = create_test_conn();
        let id = create_draft(&conn, "roads.geojson", "geojson", 10, "hash1", Some("alice")).unwrap();
        let version = require_version(&conn, id).unwrap();
        assert_eq!(version.version_number, 1);
        assert_eq!(version.status, "draft");
    }

    #[test]
    fn test_version_numbers_are_monotone() {
        let conn = create_test_conn();
        let id1 = create_draft(&conn, "a.geojson", "geojson", 1, "h1", None).unwrap();
        let id2 = create_draft(&conn, "b.geojson", "geojson", 1, "h2", None).unwrap();

        let v1 = require_version(&conn, id1).unwrap();
        let v2 = require_version(&conn, id2).unwrap();
        assert!(v2.version_number > v1.version_number);
    }

    #[test]
    fn test_guarded_transition_rejects_wrong_state() {
        let conn = create_test_conn();
        let id = create_draft(&conn, "a.geojson", "geojson", 1, "h1", None).unwrap();

        // archiving requires the version to be published first
        let result = mark_archived(&conn, id, 999);
        assert!(result.is_err());
    }

    #[test]
    fn test_configure_then_publish_transition() {
        let conn = create_test_conn();
        let id = create_draft(&conn, "a.geojson", "geojson", 1, "h1", None).unwrap();

        configure_draft(&conn, id, "roads", "WGS84", "official_ledger", false, None, None).unwrap();
        mark_published(&conn, id, "snaphash", "diffhash", 1, 0, 0).unwrap();

        let version = require_version(&conn, id).unwrap();
        assert_eq!(version.status, "published");
        assert_eq!(version.snapshot_blob_hash.as_deref(), Some("snaphash"));
        assert_eq!(version.added_count, Some(1));
    }

    #[test]
    fn test_configure_rejects_non_draft() {
        let conn = create_test_conn();
        let id = create_draft(&conn, "a.geojson", "geojson", 1, "h1", None).unwrap();
        mark_published(&conn, id, "snaphash", "diffhash", 0, 0, 0).unwrap();

        let result = configure_draft(&conn, id, "roads", "WGS84", "official_ledger", false, None, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_create_job_rejects_second_concurrent_job() {
        let conn = create_test_conn();
        let id = create_draft(&conn, "a.geojson", "geojson", 1, "h1", None).unwrap();

        create_job(&conn, id, "validate", None).unwrap();
        let second = create_job(&conn, id, "validate", None);
        assert!(second.is_err());
    }

    #[test]
    fn test_create_job_allowed_after_previous_finalized() {
        let conn = create_test_conn();
        let id = create_draft(&conn, "a.geojson", "geojson", 1, "h1", None).unwrap();

        let job_id = create_job(&conn, id, "validate", None).unwrap();
        mark_job_running(&conn, job_id).unwrap();
        finalize_job_completed(&conn, job_id).unwrap();

        let second = create_job(&conn, id, "validate", None);
        assert!(second.is_ok());
    }

    #[test]
    fn test_delete_draft_rejects_published_version() {
        let conn = create_test_conn();
        let id = create_draft(&conn, "a.geojson", "geojson", 1, "h1", None).unwrap();
        mark_published(&conn, id, "snaphash", "diffhash", 0, 0, 0).unwrap();

        let result = delete_draft(&conn, id);
        assert!(result.is_err());
    }
}
