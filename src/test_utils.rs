#![cfg(test)]

use crate::app::{create_app, AppState};
use crate::config::Config;
use crate::database::{init_database, DbConn, DbPool};
use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::Arc;

/// Create an in-memory SQLite database pool with full schema applied.
pub fn create_test_db() -> DbPool {
    let manager = SqliteConnectionManager::memory().with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        Ok(())
    });

    let pool = Pool::builder()
        .max_size(5)
        .build(manager)
        .expect("Failed to create test database pool");

    let conn = pool.get().expect("Failed to get connection from pool");
    init_database(&conn).expect("Failed to initialize test database schema");

    pool
}

/// Convenience for module tests that only need a single connection, not a
/// whole pool.
pub fn create_test_conn() -> DbConn {
    let pool = create_test_db();
    pool.get().expect("Failed to get connection from pool")
}

pub fn create_test_app() -> (Router, AppState) {
    let pool = create_test_db();
    let config = Arc::new(Config::default());
    let state = AppState {
        config: config.clone(),
        pool: pool.clone(),
        blob_store: crate::blob_store::BlobStore::new(std::env::temp_dir().join("roadnet-test")),
    };
    let app = create_app(state.clone());
    (app, state)
}

/// Seed a draft version row and return its id.
pub fn seed_draft_version(pool: &DbPool, filename: &str, format: &str) -> i64 {
    let conn = pool.get().expect("Failed to get connection");
    conn.execute(
        "INSERT INTO import_versions (version_number, status, source_filename, source_format, upload_blob_hash, created_at)
         VALUES ((SELECT COALESCE(MAX(version_number), 0) + 1 FROM import_versions), 'draft', ?, ?, 'testhash', datetime('now'))",
        rusqlite::params![filename, format],
    )
    .expect("Failed to insert test version");
    conn.last_insert_rowid()
}

pub fn seed_published_version(pool: &DbPool, filename: &str) -> i64 {
    let conn = pool.get().expect("Failed to get connection");
    conn.execute(
        "INSERT INTO import_versions (version_number, status, source_filename, source_format, upload_blob_hash, created_at, published_at)
         VALUES ((SELECT COALESCE(MAX(version_number), 0) + 1 FROM import_versions), 'published', ?, 'geojson', 'testhash', datetime('now'), datetime('now'))",
        rusqlite::params![filename],
    )
    .expect("Failed to insert published test version");
    conn.last_insert_rowid()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_db_has_roads_table() {
        let pool = create_test_db();
        let conn = pool.get().unwrap();

        let result: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='roads'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(result, 1);
    }

    #[test]
    fn test_create_test_app() {
        let (_app, _state) = create_test_app();
    }

    #[test]
    fn test_seed_draft_version_allocates_monotone_numbers() {
        let pool = create_test_db();
        let id1 = seed_draft_version(&pool, "a.geojson", "geojson");
        let id2 = seed_draft_version(&pool, "b.geojson", "geojson");
        assert!(id1 < id2);
    }
}
