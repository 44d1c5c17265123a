use crate::database::DbConn;
use crate::error::AppResult;

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// SQL for schema version tracking table
const CREATE_SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
)
"#;

/// Check if a table exists
fn table_exists(conn: &DbConn, table: &str) -> AppResult<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Get current schema version from database
fn get_schema_version(conn: &DbConn) -> AppResult<i32> {
    if !table_exists(conn, "schema_version")? {
        return Ok(0);
    }

    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Record a migration as applied
fn record_migration(conn: &DbConn, version: i32) -> AppResult<()> {
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?, datetime('now'))",
        [version],
    )?;
    Ok(())
}

/// Run all pending migrations. The base schema (schema.sql) is applied
/// separately by `init_database`; this tracks versioned changes layered on
/// top of it so existing deployments can be upgraded in place.
pub fn run_migrations(conn: &DbConn) -> AppResult<()> {
    conn.execute_batch(CREATE_SCHEMA_VERSION_TABLE)?;

    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
        record_migration(conn, 1)?;
    }

    Ok(())
}

/// Migration v1: schema.sql already creates every table for a fresh
/// database; this step only exists to stamp the version for deployments
/// that ran before versioning was introduced.
fn migrate_v1(conn: &DbConn) -> AppResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_roads_version ON roads(version_id)",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_database;
    use r2d2::Pool;
    use r2d2_sqlite::SqliteConnectionManager;

    fn create_test_db() -> DbConn {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON")?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .expect("Failed to create test database pool");

        let conn = pool.get().expect("Failed to get connection from pool");
        init_database(&conn).expect("Failed to initialize test database schema");
        conn
    }

    #[test]
    fn test_migration_fresh_database_has_schema_version() {
        let conn = create_test_db();
        run_migrations(&conn).expect("Migration should succeed");

        assert!(
            table_exists(&conn, "schema_version").unwrap(),
            "schema_version table should exist"
        );

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, 1, "Schema version should be 1 after migration");
    }

    #[test]
    fn test_migration_is_idempotent() {
        let conn = create_test_db();

        run_migrations(&conn).expect("First migration should succeed");
        run_migrations(&conn).expect("Second migration should succeed (idempotent)");

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(
            version, 1,
            "Schema version should remain 1 after idempotent run"
        );
    }

    #[test]
    fn test_roads_rtree_table_exists() {
        let conn = create_test_db();
        run_migrations(&conn).expect("Migration should succeed");

        assert!(
            table_exists(&conn, "roads_rtree").unwrap(),
            "roads_rtree table should exist"
        );
    }

    #[test]
    fn test_rtree_accepts_insert_and_bbox_query() {
        let conn = create_test_db();
        run_migrations(&conn).expect("Migration should succeed");

        conn.execute(
            "INSERT INTO roads_rtree (id, min_lng, max_lng, min_lat, max_lat) VALUES (?, ?, ?, ?, ?)",
            rusqlite::params![1, -74.1, -74.0, 40.7, 40.8],
        )
        .expect("R-tree INSERT should succeed");

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM roads_rtree WHERE min_lng <= ? AND max_lng >= ? AND min_lat <= ? AND max_lat >= ?",
                rusqlite::params![-73.0, -75.0, 41.0, 40.0],
                |row| row.get(0),
            )
            .expect("R-tree SELECT should succeed");

        assert_eq!(count, 1, "R-tree should contain 1 entry within the bbox");
    }

    #[test]
    fn test_import_versions_one_published_unique_index() {
        let conn = create_test_db();
        run_migrations(&conn).expect("Migration should succeed");

        conn.execute(
            "INSERT INTO import_versions (version_number, status, source_filename, source_format, upload_blob_hash, created_at) VALUES (1, 'published', 'a.geojson', 'geojson', 'h1', datetime('now'))",
            [],
        )
        .expect("first published version should insert");

        let result = conn.execute(
            "INSERT INTO import_versions (version_number, status, source_filename, source_format, upload_blob_hash, created_at) VALUES (2, 'published', 'b.geojson', 'geojson', 'h2', datetime('now'))",
            [],
        );

        assert!(
            result.is_err(),
            "a second published version should violate the partial unique index"
        );
    }
}
