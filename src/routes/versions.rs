use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use geo::algorithm::bounding_rect::BoundingRect;
use tracing::{error, info};

use crate::app::AppState;
use crate::blob_store::{self, BlobKind};
use crate::crs::RecognizedCrs;
use crate::diff::{self, Comparison, ImportScope};
use crate::error::{AppError, AppResult};
use crate::geo::{geojson::GeoJsonReader, gpkg::GpkgReader, SourceFormat};
use crate::job_runner;
use crate::models::{
    ConfigureDraftRequest, DataSource, DiffMode, DiffResult, ImportJob, ImportVersion, JobTriggerResponse, LayerInfo,
    ValidationResult, VersionListQuery, VersionListResponse,
};
use crate::publisher::{self, RoadSnapshotEntry};
use crate::rollback;
use crate::validator;
use crate::version_store;

const DEFAULT_PAGE_SIZE: i64 = 20;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/import/versions", get(list_versions).post(upload_version))
        .route("/import/versions/:id", get(get_version).delete(delete_version))
        .route("/import/versions/:id/layers", get(layers))
        .route("/import/versions/:id/configure", post(configure_version))
        .route("/import/versions/:id/validate", post(trigger_validate))
        .route("/import/versions/:id/validation", get(get_validation))
        .route("/import/versions/:id/preview", get(preview_diff))
        .route("/import/versions/:id/history", get(get_history))
        .route("/import/versions/:id/publish", post(trigger_publish))
        .route("/import/versions/:id/rollback", post(trigger_rollback))
        .route("/import/versions/jobs/:id", get(get_job))
}

async fn list_versions(
    State(state): State<AppState>,
    Query(query): Query<VersionListQuery>,
) -> AppResult<Json<VersionListResponse>> {
    let conn = state.pool.get().map_err(AppError::Pool)?;
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 200);

    let (data, total) = version_store::list_versions_page(&conn, query.status.as_deref(), page, page_size)?;
    Ok(Json(VersionListResponse { data, total }))
}

/// Best-effort feature count for the newly uploaded file, recorded on the
/// draft before a layer has even been chosen. GeoJSON has one implicit
/// layer, so its total is exact; a GeoPackage may have several, so the sum
/// across all of them is used as an upper bound until `configure` pins
/// down the actual layer.
fn count_upload_features(path: &std::path::Path, format: SourceFormat) -> AppResult<i64> {
    match format {
        SourceFormat::GeoJson => {
            let bytes = std::fs::read(path)?;
            Ok(GeoJsonReader::parse(&bytes)?.feature_count() as i64)
        }
        SourceFormat::Gpkg => {
            let reader = GpkgReader::open(path)?;
            let mut total = 0i64;
            for layer in reader.layers()? {
                total += reader.feature_count(&layer)?;
            }
            Ok(total)
        }
    }
}

async fn upload_version(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<ImportVersion>> {
    let mut filename = None;
    let mut bytes = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidFile(format!("malformed multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(|s| s.to_string());
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidFile(format!("failed to read upload: {}", e)))?,
            );
        }
    }

    let filename = filename.ok_or_else(|| AppError::InvalidFile("missing file field".to_string()))?;
    let bytes = bytes.ok_or_else(|| AppError::InvalidFile("missing file field".to_string()))?;

    blob_store::ensure_extension_supported(&filename)?;
    let format = SourceFormat::detect(&filename)?;

    let max_bytes = state.config.storage.max_upload_bytes;
    if bytes.len() as u64 > max_bytes {
        return Err(AppError::InvalidFile(format!(
            "upload exceeds maximum size of {} bytes",
            max_bytes
        )));
    }

    let hash = state.blob_store.put(BlobKind::Upload, &bytes).await?;
    let path = state.blob_store.path(BlobKind::Upload, &hash);
    let feature_count = count_upload_features(&path, format)?;

    let conn = state.pool.get().map_err(AppError::Pool)?;
    let version_id = version_store::create_draft(&conn, &filename, format.as_str(), feature_count, &hash, None)?;
    let version = version_store::require_version(&conn, version_id)?;

    info!("created draft version {} from {}", version_id, filename);
    Ok(Json(version))
}

async fn get_version(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ImportVersion>> {
    let conn = state.pool.get().map_err(AppError::Pool)?;
    Ok(Json(version_store::require_version(&conn, id)?))
}

async fn delete_version(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<()>> {
    let conn = state.pool.get().map_err(AppError::Pool)?;
    version_store::delete_draft(&conn, id)?;
    Ok(Json(()))
}

async fn layers(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Vec<LayerInfo>>> {
    let version = {
        let conn = state.pool.get().map_err(AppError::Pool)?;
        version_store::require_version(&conn, id)?
    };

    let format = SourceFormat::detect(&version.source_filename)?;
    let path = state.blob_store.path(BlobKind::Upload, &version.upload_blob_hash);

    match format {
        SourceFormat::GeoJson => {
            let bytes = std::fs::read(&path)?;
            let reader = GeoJsonReader::parse(&bytes)?;
            Ok(Json(
                reader
                    .layers()
                    .into_iter()
                    .map(|name| LayerInfo {
                        name,
                        feature_count: reader.feature_count() as i64,
                        geometry_type: "mixed".to_string(),
                    })
                    .collect(),
            ))
        }
        SourceFormat::Gpkg => {
            let reader = GpkgReader::open(&path)?;
            let layer_names = reader.layers()?;
            let mut out = Vec::with_capacity(layer_names.len());
            for name in layer_names {
                let feature_count = reader.feature_count(&name)?;
                out.push(LayerInfo {
                    name,
                    feature_count,
                    geometry_type: "mixed".to_string(),
                });
            }
            Ok(Json(out))
        }
    }
}

struct TransformedFeature {
    id: String,
    geometry_json: String,
    properties_json: String,
    data_source: String,
    min_lng: f64,
    min_lat: f64,
    max_lng: f64,
    max_lat: f64,
}

/// Reads a source file, CRS-transforms every feature into WGS84, and
/// computes each feature's bounding box for the R-tree shadow index. Takes
/// an explicit layer/CRS rather than reading them off a version, so it can
/// be used both against a fully-configured draft and, during `configure`,
/// to auto-derive a bbox scope before the draft's own layer/CRS columns
/// have been persisted. `default_data_source` backs each feature's
/// `dataSource` when `properties.dataSource` is absent.
fn load_transformed_features_with(
    state: &AppState,
    upload_blob_hash: &str,
    source_filename: &str,
    layer: &str,
    crs_code: &str,
    default_data_source: &str,
) -> AppResult<Vec<TransformedFeature>> {
    let format = SourceFormat::detect(source_filename)?;
    let crs = RecognizedCrs::parse(crs_code)?;

    let path = state.blob_store.path(BlobKind::Upload, upload_blob_hash);
    let raw_features = match format {
        SourceFormat::GeoJson => {
            let bytes = std::fs::read(&path)?;
            GeoJsonReader::parse(&bytes)?.features()?
        }
        SourceFormat::Gpkg => GpkgReader::open(&path)?.features(layer)?,
    };

    raw_features
        .into_iter()
        .enumerate()
        .map(|(i, feature)| {
            let id = feature.id.clone().unwrap_or_else(|| format!("{}:{}", upload_blob_hash, i));
            let geometry = crate::crs::transform_geometry(&feature.geometry, crs)?;

            let rect = geometry
                .bounding_rect()
                .ok_or_else(|| AppError::CorruptedGeometry(format!("feature {} has no extent", id)))?;

            let gj_value = geojson::Value::from(&geometry);
            let geometry_json = serde_json::to_string(&geojson::Geometry::new(gj_value)).map_err(AppError::Json)?;
            let properties_json = serde_json::to_string(&feature.properties).map_err(AppError::Json)?;
            let data_source = feature
                .properties
                .get("dataSource")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| default_data_source.to_string());

            Ok(TransformedFeature {
                id,
                geometry_json,
                properties_json,
                data_source,
                min_lng: rect.min().x,
                min_lat: rect.min().y,
                max_lng: rect.max().x,
                max_lat: rect.max().y,
            })
        })
        .collect()
}

/// Shared by diff preview and publish so both see the exact same feature
/// set for an already-configured version.
fn load_transformed_features(state: &AppState, version: &ImportVersion) -> AppResult<Vec<TransformedFeature>> {
    let layer = version
        .source_layer
        .as_deref()
        .ok_or_else(|| AppError::InvalidTransition("version has not been configured".to_string()))?;
    let crs_code = version
        .crs
        .as_deref()
        .ok_or_else(|| AppError::InvalidTransition("version has not been configured".to_string()))?;

    load_transformed_features_with(
        state,
        &version.upload_blob_hash,
        &version.source_filename,
        layer,
        crs_code,
        &version.default_data_source,
    )
}

fn union_bbox(features: &[TransformedFeature]) -> AppResult<(f64, f64, f64, f64)> {
    let mut iter = features.iter();
    let first = iter
        .next()
        .ok_or_else(|| AppError::InvalidFile("source file has no features to derive a scope from".to_string()))?;
    let mut bbox = (first.min_lng, first.min_lat, first.max_lng, first.max_lat);
    for f in iter {
        bbox.0 = bbox.0.min(f.min_lng);
        bbox.1 = bbox.1.min(f.min_lat);
        bbox.2 = bbox.2.max(f.max_lng);
        bbox.3 = bbox.3.max(f.max_lat);
    }
    Ok(bbox)
}

async fn configure_version(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ConfigureDraftRequest>,
) -> AppResult<Json<ImportVersion>> {
    RecognizedCrs::parse(&request.source_crs)?;
    if !DataSource::is_valid(&request.default_data_source) {
        return Err(AppError::BadRequest(format!(
            "unrecognized data source: {}",
            request.default_data_source
        )));
    }

    let version = {
        let conn = state.pool.get().map_err(AppError::Pool)?;
        version_store::require_version(&conn, id)?
    };

    let scope_string = match &request.scope {
        Some(s) => {
            ImportScope::parse(s)?;
            s.clone()
        }
        None => {
            let features = load_transformed_features_with(
                &state,
                &version.upload_blob_hash,
                &version.source_filename,
                &request.layer_name,
                &request.source_crs,
                &request.default_data_source,
            )?;
            let (min_lng, min_lat, max_lng, max_lat) = union_bbox(&features)?;
            format!("bbox:{},{},{},{}", min_lng, min_lat, max_lng, max_lat)
        }
    };

    let conn = state.pool.get().map_err(AppError::Pool)?;
    version_store::configure_draft(
        &conn,
        id,
        &request.layer_name,
        &request.source_crs,
        &request.default_data_source,
        request.regional_refresh,
        Some(&scope_string),
        request.source_export_id.as_deref(),
    )?;
    Ok(Json(version_store::require_version(&conn, id)?))
}

async fn trigger_validate(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<JobTriggerResponse>> {
    let job_id = {
        let conn = state.pool.get().map_err(AppError::Pool)?;
        version_store::create_job(&conn, id, "validate", None)?
    };

    tokio::spawn(run_validate_job(state, id, job_id));

    Ok(Json(JobTriggerResponse {
        job_id,
        status: "pending".to_string(),
    }))
}

async fn run_validate_job(state: AppState, version_id: i64, job_id: i64) {
    let handle = job_runner::register(job_id);

    {
        let conn = match state.pool.get() {
            Ok(c) => c,
            Err(e) => {
                error!("failed to get connection to start validate job {}: {}", job_id, e);
                return;
            }
        };
        if let Err(e) = version_store::mark_job_running(&conn, job_id) {
            error!("failed to mark validate job {} running: {}", job_id, e);
            return;
        }
    }

    let result = tokio::task::spawn_blocking({
        let state = state.clone();
        move || -> AppResult<ValidationResult> {
            let conn = state.pool.get().map_err(AppError::Pool)?;
            let version = version_store::require_version(&conn, version_id)?;
            let format = SourceFormat::detect(&version.source_filename)?;
            let layer = version
                .source_layer
                .as_deref()
                .ok_or_else(|| AppError::InvalidTransition("version has not been configured".to_string()))?;

            let path = state.blob_store.path(BlobKind::Upload, &version.upload_blob_hash);
            let features = match format {
                SourceFormat::GeoJson => {
                    let bytes = std::fs::read(&path)?;
                    GeoJsonReader::parse(&bytes)?.features()?
                }
                SourceFormat::Gpkg => GpkgReader::open(&path)?.features(layer)?,
            };

            let result = validator::validate_all(&state.config.validation, &features)?;
            version_store::store_validation_result(&conn, job_id, &result)?;

            Ok(result)
        }
    })
    .await;

    let conn = match state.pool.get() {
        Ok(c) => c,
        Err(e) => {
            error!("failed to get connection to finalize validate job {}: {}", job_id, e);
            return;
        }
    };

    if handle.is_cancelled() {
        let _ = version_store::finalize_job_failed(&conn, job_id, "cancelled");
        return;
    }

    match result {
        Ok(Ok(_)) => {
            let _ = version_store::finalize_job_completed(&conn, job_id);
        }
        Ok(Err(e)) => {
            error!("validate job {} failed: {}", job_id, e);
            let _ = version_store::finalize_job_failed(&conn, job_id, &e.to_string());
        }
        Err(e) => {
            error!("validate job {} panicked: {}", job_id, e);
            let _ = version_store::finalize_job_failed(&conn, job_id, "internal error");
        }
    }
}

async fn get_validation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ValidationResult>> {
    let conn = state.pool.get().map_err(AppError::Pool)?;
    let job = version_store::get_latest_job(&conn, id, "validate")?
        .ok_or_else(|| AppError::NotFound(format!("no validation job for version {}", id)))?;

    version_store::get_validation_result(&conn, job.id)?
        .ok_or_else(|| AppError::NotFound(format!("validation result for job {} not ready", job.id)))
        .map(Json)
}

async fn preview_diff(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<DiffResult>> {
    let version = {
        let conn = state.pool.get().map_err(AppError::Pool)?;
        version_store::require_version(&conn, id)?
    };

    let transformed = load_transformed_features(&state, &version)?;
    let incoming: Vec<(String, String, String)> = transformed
        .into_iter()
        .map(|f| (f.id, f.geometry_json, f.properties_json))
        .collect();

    let mode = if version.regional_refresh {
        DiffMode::RegionalRefresh
    } else {
        DiffMode::Incremental
    };

    let baseline = match &version.source_export_id {
        Some(hash) => {
            let bytes = state.blob_store.open(BlobKind::Snapshot, hash).await?;
            let entries: Vec<RoadSnapshotEntry> = serde_json::from_slice(&bytes)
                .map_err(|e| AppError::IntegrityViolation(format!("corrupt source export blob: {}", e)))?;
            Some(entries)
        }
        None => None,
    };

    let conn = state.pool.get().map_err(AppError::Pool)?;
    let comparison = match &baseline {
        Some(entries) => Comparison::Precise(entries),
        None => {
            let scope_str = version
                .scope
                .as_deref()
                .ok_or_else(|| AppError::InvalidScope("version has no configured scope".to_string()))?;
            Comparison::Bbox(ImportScope::parse(scope_str)?)
        }
    };

    let result = diff::compute(&conn, &comparison, mode, &incoming, state.config.validation.epsilon_geom)?;
    Ok(Json(result))
}

/// Serves the authoritative diff recorded at publish time, for any version
/// that has gone through the Publisher at least once. Unlike `preview_diff`
/// (recomputed on demand for drafts), this is never recomputed.
async fn get_history(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<DiffResult>> {
    let version = {
        let conn = state.pool.get().map_err(AppError::Pool)?;
        version_store::require_version(&conn, id)?
    };

    let diff_hash = version
        .diff_blob_hash
        .ok_or_else(|| AppError::NotFound(format!("version {} has no recorded historical diff", id)))?;

    let bytes = state.blob_store.open(BlobKind::Diff, &diff_hash).await?;
    let result: DiffResult = serde_json::from_slice(&bytes)
        .map_err(|e| AppError::IntegrityViolation(format!("corrupt diff blob: {}", e)))?;
    Ok(Json(result))
}

/// Synchronous preconditions a publish must satisfy before a job is ever
/// enqueued: the version must be a draft with a completed, passing
/// validation result. A version failing these stays untouched and no job
/// row is created — unlike the asynchronous failure a bad publish attempt
/// would otherwise only surface after the caller has already gotten a 202.
fn check_publish_preconditions(conn: &crate::database::DbConn, version_id: i64) -> AppResult<()> {
    let version = version_store::require_version(conn, version_id)?;
    if version.status != "draft" {
        return Err(AppError::InvalidTransition(format!(
            "version {} must be a draft to publish",
            version_id
        )));
    }

    let latest_validation = version_store::get_latest_job(conn, version_id, "validate")?
        .ok_or_else(|| AppError::ValidationBlocked(format!("version {} has not been validated", version_id)))?;
    if latest_validation.status != "completed" {
        return Err(AppError::ValidationBlocked(format!(
            "version {} validation is not complete",
            version_id
        )));
    }
    let validation_result = version_store::get_validation_result(conn, latest_validation.id)?
        .ok_or_else(|| AppError::ValidationBlocked(format!("version {} has no validation result", version_id)))?;
    if !validation_result.passed {
        return Err(AppError::ValidationBlocked(format!(
            "version {} failed validation",
            version_id
        )));
    }

    Ok(())
}

async fn trigger_publish(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<JobTriggerResponse>> {
    let job_id = {
        let conn = state.pool.get().map_err(AppError::Pool)?;
        check_publish_preconditions(&conn, id)?;
        version_store::create_job(&conn, id, "publish", None)?
    };

    tokio::spawn(run_publish_job(state, id, job_id));

    Ok(Json(JobTriggerResponse {
        job_id,
        status: "pending".to_string(),
    }))
}

async fn run_publish_job(state: AppState, version_id: i64, job_id: i64) {
    {
        let conn = match state.pool.get() {
            Ok(c) => c,
            Err(e) => {
                error!("failed to get connection to start publish job {}: {}", job_id, e);
                return;
            }
        };
        if let Err(e) = version_store::mark_job_running(&conn, job_id) {
            error!("failed to mark publish job {} running: {}", job_id, e);
            return;
        }
    }

    let version = {
        let conn = match state.pool.get() {
            Ok(c) => c,
            Err(e) => {
                error!("failed to get connection for publish job {}: {}", job_id, e);
                return;
            }
        };
        match version_store::require_version(&conn, version_id) {
            Ok(v) => v,
            Err(e) => {
                let _ = version_store::finalize_job_failed(&conn, job_id, &e.to_string());
                return;
            }
        }
    };

    let entries = match load_transformed_features(&state, &version) {
        Ok(features) => features
            .into_iter()
            .map(|f| RoadSnapshotEntry {
                id: f.id,
                geometry_json: f.geometry_json,
                properties_json: f.properties_json,
                data_source: f.data_source,
                min_lng: f.min_lng,
                min_lat: f.min_lat,
                max_lng: f.max_lng,
                max_lat: f.max_lat,
            })
            .collect::<Vec<_>>(),
        Err(e) => {
            if let Ok(conn) = state.pool.get() {
                let _ = version_store::finalize_job_failed(&conn, job_id, &e.to_string());
            }
            return;
        }
    };

    let result = publisher::publish(
        &state.pool,
        &state.blob_store,
        version_id,
        entries,
        state.config.validation.epsilon_geom,
    )
    .await;

    let conn = match state.pool.get() {
        Ok(c) => c,
        Err(e) => {
            error!("failed to get connection to finalize publish job {}: {}", job_id, e);
            return;
        }
    };

    match result {
        Ok(diff) => {
            info!("published version {}: {:?}", version_id, diff);
            let _ = version_store::finalize_job_completed(&conn, job_id);
        }
        Err(e) => {
            error!("publish job {} failed: {}", job_id, e);
            let _ = version_store::finalize_job_failed(&conn, job_id, &e.to_string());
        }
    }
}

/// `:id` here is the rollback *target* — an archived version with a
/// recorded snapshot. The rollback creates and publishes a brand-new
/// version restoring that snapshot; the target itself is left archived.
async fn trigger_rollback(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<JobTriggerResponse>> {
    let job_id = {
        let conn = state.pool.get().map_err(AppError::Pool)?;
        version_store::create_job(&conn, id, "rollback", None)?
    };

    tokio::spawn(run_rollback_job(state, id, job_id));

    Ok(Json(JobTriggerResponse {
        job_id,
        status: "pending".to_string(),
    }))
}

async fn run_rollback_job(state: AppState, target_version_id: i64, job_id: i64) {
    {
        let conn = match state.pool.get() {
            Ok(c) => c,
            Err(e) => {
                error!("failed to get connection to start rollback job {}: {}", job_id, e);
                return;
            }
        };
        if let Err(e) = version_store::mark_job_running(&conn, job_id) {
            error!("failed to mark rollback job {} running: {}", job_id, e);
            return;
        }
    }

    let result = rollback::rollback(
        &state.pool,
        &state.blob_store,
        target_version_id,
        state.config.validation.epsilon_geom,
    )
    .await;

    let conn = match state.pool.get() {
        Ok(c) => c,
        Err(e) => {
            error!("failed to get connection to finalize rollback job {}: {}", job_id, e);
            return;
        }
    };

    match result {
        Ok(new_version_id) => {
            info!("rolled back to version {}, new published version {}", target_version_id, new_version_id);
            let _ = version_store::finalize_job_completed(&conn, job_id);
        }
        Err(e) => {
            error!("rollback job {} failed: {}", job_id, e);
            let _ = version_store::finalize_job_failed(&conn, job_id, &e.to_string());
        }
    }
}

async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<ImportJob>> {
    let conn = state.pool.get().map_err(AppError::Pool)?;
    Ok(Json(version_store::require_job(&conn, id)?))
}
