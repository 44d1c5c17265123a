use crate::database::{execute_query, fetch_all, fetch_one, queries, DbConn};
use crate::error::AppResult;
use crate::models::Road;
use rusqlite::Row;

fn map_road(row: &Row<'_>) -> rusqlite::Result<Road> {
    Ok(Road {
        id: row.get(0)?,
        version_id: row.get(1)?,
        status: row.get(2)?,
        geometry: serde_json::from_str(&row.get::<_, String>(3)?).unwrap_or(serde_json::Value::Null),
        properties: serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or(serde_json::Value::Null),
        data_source: row.get(5)?,
        min_lng: row.get(6)?,
        min_lat: row.get(7)?,
        max_lng: row.get(8)?,
        max_lat: row.get(9)?,
        replaced_by: row.get(10)?,
        valid_from: row.get(11)?,
        valid_to: row.get(12)?,
    })
}

/// The reference implementation of the external asset store roads live in.
/// This process is the only writer (see ownership note in the design doc);
/// any deployment could swap it for a different store behind this same
/// shape of calls.
pub fn get_active(conn: &DbConn, road_id: &str) -> AppResult<Option<Road>> {
    fetch_one(conn, queries::roads::SELECT_ACTIVE_BY_ID, &[&road_id], map_road)
}

pub fn get_by_id(conn: &DbConn, road_id: &str) -> AppResult<Option<Road>> {
    fetch_one(conn, queries::roads::SELECT_BY_ID, &[&road_id], map_road)
}

/// Every active road regardless of location; backs `full` scope imports
/// and the live-extras half of a Precise-mode comparison.
pub fn active_all(conn: &DbConn) -> AppResult<Vec<Road>> {
    fetch_all(conn, queries::roads::SELECT_ACTIVE_ALL, &[], map_road)
}

/// Roads tagged to a ward via `properties.ward`; backs `ward:<name>` scope
/// imports. Wards are an ordinary attribute, not a separate column — the
/// same opaque-JSON attribute bag every other property lives in.
pub fn active_by_ward(conn: &DbConn, ward: &str) -> AppResult<Vec<Road>> {
    fetch_all(conn, queries::roads::SELECT_ACTIVE_BY_WARD, &[&ward], map_road)
}

pub fn active_in_bbox(
    conn: &DbConn,
    min_lng: f64,
    max_lng: f64,
    min_lat: f64,
    max_lat: f64,
) -> AppResult<Vec<Road>> {
    fetch_all(
        conn,
        queries::roads::SELECT_ACTIVE_IN_BBOX,
        &[&max_lng, &min_lng, &max_lat, &min_lat],
        map_road,
    )
}

pub struct NewRoad<'a> {
    pub id: &'a str,
    pub version_id: i64,
    pub geometry_json: &'a str,
    pub properties_json: &'a str,
    pub data_source: &'a str,
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

/// Inserts a new active road row and its R-tree shadow entry together, in
/// a single DB connection, so the index can never observe a road without a
/// matching bbox entry.
pub fn insert(conn: &DbConn, road: &NewRoad<'_>) -> AppResult<()> {
    execute_query(
        conn,
        queries::roads::INSERT,
        &[
            &road.id,
            &road.version_id,
            &road.geometry_json,
            &road.properties_json,
            &road.data_source,
            &road.min_lng,
            &road.min_lat,
            &road.max_lng,
            &road.max_lat,
        ],
    )?;

    let rowid = conn.last_insert_rowid();
    insert_into_rtree(conn, rowid, road.min_lng, road.max_lng, road.min_lat, road.max_lat)?;
    Ok(())
}

pub fn update_geometry(conn: &DbConn, road: &NewRoad<'_>) -> AppResult<()> {
    execute_query(
        conn,
        queries::roads::UPDATE_GEOMETRY,
        &[
            &road.geometry_json,
            &road.properties_json,
            &road.data_source,
            &road.min_lng,
            &road.min_lat,
            &road.max_lng,
            &road.max_lat,
            &road.version_id,
            &road.id,
        ],
    )?;

    if let Some(existing) = get_active(conn, road.id)? {
        let rowid = road_rowid(conn, &existing.id)?;
        update_rtree(conn, rowid, road.min_lng, road.max_lng, road.min_lat, road.max_lat)?;
    }
    Ok(())
}

pub fn deactivate(conn: &DbConn, road_id: &str, replaced_by: Option<&str>) -> AppResult<()> {
    execute_query(conn, queries::roads::DEACTIVATE, &[&replaced_by, &road_id])?;
    let rowid = road_rowid(conn, road_id)?;
    delete_from_rtree(conn, rowid)
}

pub fn archive_to_history(
    conn: &DbConn,
    road_id: &str,
    version_id: i64,
    geometry_json: &str,
    properties_json: &str,
    valid_from: &str,
) -> AppResult<()> {
    execute_query(
        conn,
        queries::road_history::INSERT,
        &[&road_id, &version_id, &geometry_json, &properties_json, &valid_from],
    )?;
    Ok(())
}

fn road_rowid(conn: &DbConn, road_id: &str) -> AppResult<i64> {
    let rowid: i64 = conn.query_row("SELECT rowid FROM roads WHERE id = ?", [road_id], |row| {
        row.get(0)
    })?;
    Ok(rowid)
}

fn insert_into_rtree(
    conn: &DbConn,
    rowid: i64,
    min_lng: f64,
    max_lng: f64,
    min_lat: f64,
    max_lat: f64,
) -> AppResult<()> {
    execute_query(
        conn,
        queries::roads_rtree::INSERT,
        &[&rowid, &min_lng, &max_lng, &min_lat, &max_lat],
    )?;
    Ok(())
}

fn update_rtree(
    conn: &DbConn,
    rowid: i64,
    min_lng: f64,
    max_lng: f64,
    min_lat: f64,
    max_lat: f64,
) -> AppResult<()> {
    execute_query(
        conn,
        queries::roads_rtree::UPDATE,
        &[&min_lng, &max_lng, &min_lat, &max_lat, &rowid],
    )?;
    Ok(())
}

fn delete_from_rtree(conn: &DbConn, rowid: i64) -> AppResult<()> {
    execute_query(conn, queries::roads_rtree::DELETE, &[&rowid])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_conn;

    fn sample_road(id: &'static str) -> NewRoad<'static> {
        NewRoad {
            id,
            version_id: 1,
            geometry_json: r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#,
            properties_json: "{}",
            data_source: "official_ledger",
            min_lng: 0.0,
            min_lat: 0.0,
            max_lng: 1.0,
            max_lat: 1.0,
        }
    }

    #[test]
    fn test_insert_and_get_active() {
        let conn = create_test_conn();
        seed_version(&conn);

        insert(&conn, &sample_road("r1")).unwrap();
        let road = get_active(&conn, "r1").unwrap().unwrap();
        assert_eq!(road.status, "active");
    }

    #[test]
    fn test_bbox_query_finds_inserted_road() {
        let conn = create_test_conn();
        seed_version(&conn);
        insert(&conn, &sample_road("r1")).unwrap();

        let found = active_in_bbox(&conn, -1.0, 2.0, -1.0, 2.0).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "r1");
    }

    #[test]
    fn test_bbox_query_excludes_out_of_range_road() {
        let conn = create_test_conn();
        seed_version(&conn);
        insert(&conn, &sample_road("r1")).unwrap();

        let found = active_in_bbox(&conn, 10.0, 20.0, 10.0, 20.0).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_deactivate_removes_from_rtree() {
        let conn = create_test_conn();
        seed_version(&conn);
        insert(&conn, &sample_road("r1")).unwrap();

        deactivate(&conn, "r1", None).unwrap();

        let found = active_in_bbox(&conn, -1.0, 2.0, -1.0, 2.0).unwrap();
        assert!(found.is_empty());
    }

    fn seed_version(conn: &DbConn) {
        conn.execute(
            "INSERT INTO import_versions (version_number, status, source_filename, source_format, upload_blob_hash, created_at) VALUES (1, 'published', 'a.geojson', 'geojson', 'h', datetime('now'))",
            [],
        )
        .unwrap();
    }
}
