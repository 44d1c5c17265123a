pub mod import_versions {
    pub const INSERT_DRAFT: &str = r#"
    INSERT INTO import_versions (
        version_number
      , status
      , source_filename
      , source_format
      , feature_count
      , upload_blob_hash
      , created_by
      , created_at
    ) VALUES (
        (SELECT COALESCE(MAX(version_number), 0) + 1 FROM import_versions)
      , 'draft'
      , ?
      , ?
      , ?
      , ?
      , ?
      , datetime('now')
    )
    "#;

    pub const CONFIGURE_DRAFT: &str = r#"
    UPDATE import_versions
       SET source_layer = ?
         , crs = ?
         , default_data_source = ?
         , regional_refresh = ?
         , scope = ?
         , source_export_id = ?
     WHERE id = ?
       AND status = 'draft'
    "#;

    pub const SELECT_BY_ID: &str = r#"
    SELECT id
         , version_number
         , status
         , source_filename
         , source_format
         , source_layer
         , crs
         , scope
         , default_data_source
         , regional_refresh
         , source_export_id
         , feature_count
         , upload_blob_hash
         , snapshot_blob_hash
         , diff_blob_hash
         , added_count
         , updated_count
         , deactivated_count
         , created_by
         , created_at
         , published_at
         , archived_at
         , rolled_back_at
         , superseded_by_version_id
      FROM import_versions
     WHERE id = ?
    "#;

    pub const SELECT_ALL: &str = r#"
    SELECT id
         , version_number
         , status
         , source_filename
         , source_format
         , source_layer
         , crs
         , scope
         , default_data_source
         , regional_refresh
         , source_export_id
         , feature_count
         , upload_blob_hash
         , snapshot_blob_hash
         , diff_blob_hash
         , added_count
         , updated_count
         , deactivated_count
         , created_by
         , created_at
         , published_at
         , archived_at
         , rolled_back_at
         , superseded_by_version_id
      FROM import_versions
     ORDER BY version_number DESC
    "#;

    pub const SELECT_PAGE: &str = r#"
    SELECT id
         , version_number
         , status
         , source_filename
         , source_format
         , source_layer
         , crs
         , scope
         , default_data_source
         , regional_refresh
         , source_export_id
         , feature_count
         , upload_blob_hash
         , snapshot_blob_hash
         , diff_blob_hash
         , added_count
         , updated_count
         , deactivated_count
         , created_by
         , created_at
         , published_at
         , archived_at
         , rolled_back_at
         , superseded_by_version_id
      FROM import_versions
     ORDER BY version_number DESC
     LIMIT ? OFFSET ?
    "#;

    pub const SELECT_PAGE_BY_STATUS: &str = r#"
    SELECT id
         , version_number
         , status
         , source_filename
         , source_format
         , source_layer
         , crs
         , scope
         , default_data_source
         , regional_refresh
         , source_export_id
         , feature_count
         , upload_blob_hash
         , snapshot_blob_hash
         , diff_blob_hash
         , added_count
         , updated_count
         , deactivated_count
         , created_by
         , created_at
         , published_at
         , archived_at
         , rolled_back_at
         , superseded_by_version_id
      FROM import_versions
     WHERE status = ?
     ORDER BY version_number DESC
     LIMIT ? OFFSET ?
    "#;

    pub const SELECT_PUBLISHED: &str = r#"
    SELECT id
         , version_number
         , status
         , source_filename
         , source_format
         , source_layer
         , crs
         , scope
         , default_data_source
         , regional_refresh
         , source_export_id
         , feature_count
         , upload_blob_hash
         , snapshot_blob_hash
         , diff_blob_hash
         , added_count
         , updated_count
         , deactivated_count
         , created_by
         , created_at
         , published_at
         , archived_at
         , rolled_back_at
         , superseded_by_version_id
      FROM import_versions
     WHERE status = 'published'
     LIMIT 1
    "#;

    pub const COUNT_ALL: &str = r#"
    SELECT COUNT(*) FROM import_versions
    "#;

    pub const COUNT_BY_STATUS: &str = r#"
    SELECT COUNT(*) FROM import_versions WHERE status = ?
    "#;

    pub const MARK_PUBLISHED: &str = r#"
    UPDATE import_versions
       SET status = 'published'
         , snapshot_blob_hash = ?
         , diff_blob_hash = ?
         , added_count = ?
         , updated_count = ?
         , deactivated_count = ?
         , published_at = datetime('now')
     WHERE id = ?
       AND status = 'draft'
    "#;

    pub const MARK_ARCHIVED: &str = r#"
    UPDATE import_versions
       SET status = 'archived'
         , archived_at = datetime('now')
         , superseded_by_version_id = ?
     WHERE id = ?
       AND status = 'published'
    "#;

    pub const MARK_ROLLED_BACK: &str = r#"
    UPDATE import_versions
       SET status = 'rolled_back'
         , rolled_back_at = datetime('now')
         , superseded_by_version_id = ?
     WHERE id = ?
       AND status = 'published'
    "#;

    pub const STORE_DIFF_BLOB: &str = r#"
    UPDATE import_versions SET diff_blob_hash = ? WHERE id = ?
    "#;

    pub const DELETE_DRAFT: &str = r#"
    DELETE FROM import_versions WHERE id = ? AND status = 'draft'
    "#;
}

pub mod import_jobs {
    pub const INSERT: &str = r#"
    INSERT INTO import_jobs (
        version_id
      , kind
      , status
      , triggered_by
      , created_at
      , updated_at
    ) VALUES (?, ?, 'pending', ?, datetime('now'), datetime('now'))
    "#;

    pub const MARK_RUNNING: &str = r#"
    UPDATE import_jobs
       SET status = 'running'
         , updated_at = datetime('now')
     WHERE id = ?
       AND status = 'pending'
    "#;

    pub const SELECT_BY_ID: &str = r#"
    SELECT id
         , version_id
         , kind
         , status
         , progress_processed
         , progress_total
         , error_message
         , triggered_by
         , created_at
         , updated_at
         , finished_at
      FROM import_jobs
     WHERE id = ?
    "#;

    pub const SELECT_NON_TERMINAL_FOR_VERSION: &str = r#"
    SELECT id
         , version_id
         , kind
         , status
         , progress_processed
         , progress_total
         , error_message
         , triggered_by
         , created_at
         , updated_at
         , finished_at
      FROM import_jobs
     WHERE version_id = ?
       AND status IN ('pending', 'running')
    "#;

    pub const SELECT_LATEST_BY_VERSION_AND_KIND: &str = r#"
    SELECT id
         , version_id
         , kind
         , status
         , progress_processed
         , progress_total
         , error_message
         , triggered_by
         , created_at
         , updated_at
         , finished_at
      FROM import_jobs
     WHERE version_id = ?
       AND kind = ?
     ORDER BY id DESC
     LIMIT 1
    "#;

    pub const UPDATE_PROGRESS: &str = r#"
    UPDATE import_jobs
       SET progress_processed = ?
         , progress_total = ?
         , updated_at = datetime('now')
     WHERE id = ?
       AND status = 'running'
    "#;

    pub const FINALIZE_COMPLETED: &str = r#"
    UPDATE import_jobs
       SET status = 'completed'
         , updated_at = datetime('now')
         , finished_at = datetime('now')
     WHERE id = ?
       AND status = 'running'
    "#;

    pub const FINALIZE_FAILED: &str = r#"
    UPDATE import_jobs
       SET status = 'failed'
         , error_message = ?
         , updated_at = datetime('now')
         , finished_at = datetime('now')
     WHERE id = ?
       AND status = 'running'
    "#;
}

pub mod validation_results {
    pub const INSERT: &str = r#"
    INSERT INTO validation_results (
        job_id
      , feature_count
      , error_count
      , warning_count
      , missing_id_count
      , missing_data_source_count
      , geometry_types_json
      , errors_json
      , warnings_json
      , passed
      , created_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
    "#;

    pub const SELECT_BY_JOB_ID: &str = r#"
    SELECT id
         , job_id
         , feature_count
         , error_count
         , warning_count
         , missing_id_count
         , missing_data_source_count
         , geometry_types_json
         , errors_json
         , warnings_json
         , passed
         , created_at
      FROM validation_results
     WHERE job_id = ?
     ORDER BY id DESC
     LIMIT 1
    "#;
}

pub mod roads {
    pub const INSERT: &str = r#"
    INSERT INTO roads (
        id
      , version_id
      , status
      , geometry_json
      , properties_json
      , data_source
      , min_lng
      , min_lat
      , max_lng
      , max_lat
      , valid_from
    ) VALUES (?, ?, 'active', ?, ?, ?, ?, ?, ?, ?, datetime('now'))
    "#;

    pub const SELECT_BY_ID: &str = r#"
    SELECT id
         , version_id
         , status
         , geometry_json
         , properties_json
         , data_source
         , min_lng
         , min_lat
         , max_lng
         , max_lat
         , replaced_by
         , valid_from
         , valid_to
      FROM roads
     WHERE id = ?
    "#;

    pub const SELECT_ACTIVE_BY_ID: &str = r#"
    SELECT id
         , version_id
         , status
         , geometry_json
         , properties_json
         , data_source
         , min_lng
         , min_lat
         , max_lng
         , max_lat
         , replaced_by
         , valid_from
         , valid_to
      FROM roads
     WHERE id = ?
       AND status = 'active'
    "#;

    pub const SELECT_ACTIVE_ALL: &str = r#"
    SELECT id
         , version_id
         , status
         , geometry_json
         , properties_json
         , data_source
         , min_lng
         , min_lat
         , max_lng
         , max_lat
         , replaced_by
         , valid_from
         , valid_to
      FROM roads
     WHERE status = 'active'
    "#;

    pub const SELECT_ACTIVE_IN_BBOX: &str = r#"
    SELECT r.id
         , r.version_id
         , r.status
         , r.geometry_json
         , r.properties_json
         , r.data_source
         , r.min_lng
         , r.min_lat
         , r.max_lng
         , r.max_lat
         , r.replaced_by
         , r.valid_from
         , r.valid_to
      FROM roads AS r
      JOIN roads_rtree AS t ON t.id = r.rowid
     WHERE r.status = 'active'
       AND t.min_lng <= ?
       AND t.max_lng >= ?
       AND t.min_lat <= ?
       AND t.max_lat >= ?
    "#;

    pub const SELECT_ACTIVE_BY_WARD: &str = r#"
    SELECT id
         , version_id
         , status
         , geometry_json
         , properties_json
         , data_source
         , min_lng
         , min_lat
         , max_lng
         , max_lat
         , replaced_by
         , valid_from
         , valid_to
      FROM roads
     WHERE status = 'active'
       AND json_extract(properties_json, '$.ward') = ?
    "#;

    pub const UPDATE_GEOMETRY: &str = r#"
    UPDATE roads
       SET geometry_json = ?
         , properties_json = ?
         , data_source = ?
         , min_lng = ?
         , min_lat = ?
         , max_lng = ?
         , max_lat = ?
         , version_id = ?
     WHERE id = ?
       AND status = 'active'
    "#;

    pub const DEACTIVATE: &str = r#"
    UPDATE roads
       SET status = 'inactive'
         , valid_to = datetime('now')
         , replaced_by = ?
     WHERE id = ?
       AND status = 'active'
    "#;

    pub const REACTIVATE: &str = r#"
    UPDATE roads
       SET status = 'active'
         , valid_to = NULL
         , replaced_by = NULL
         , geometry_json = ?
         , properties_json = ?
         , min_lng = ?
         , min_lat = ?
         , max_lng = ?
         , max_lat = ?
         , version_id = ?
     WHERE id = ?
    "#;

    pub const DELETE: &str = r#"
    DELETE FROM roads WHERE id = ?
    "#;
}

pub mod road_history {
    pub const INSERT: &str = r#"
    INSERT INTO road_history (
        road_id
      , version_id
      , geometry_json
      , properties_json
      , valid_from
      , valid_to
    ) VALUES (?, ?, ?, ?, ?, datetime('now'))
    "#;

    pub const SELECT_BY_ROAD_ID: &str = r#"
    SELECT id
         , road_id
         , version_id
         , geometry_json
         , properties_json
         , valid_from
         , valid_to
      FROM road_history
     WHERE road_id = ?
     ORDER BY id ASC
    "#;
}

pub mod roads_rtree {
    pub const INSERT: &str = r#"
    INSERT INTO roads_rtree (id, min_lng, max_lng, min_lat, max_lat) VALUES (?, ?, ?, ?, ?)
    "#;

    pub const UPDATE: &str = r#"
    UPDATE roads_rtree SET min_lng = ?, max_lng = ?, min_lat = ?, max_lat = ? WHERE id = ?
    "#;

    pub const DELETE: &str = r#"
    DELETE FROM roads_rtree WHERE id = ?
    "#;
}
