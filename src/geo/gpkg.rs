use crate::error::{AppError, AppResult};
use crate::geo::raw_feature::RawFeature;
use rusqlite::Connection;
use std::io::Cursor;
use std::path::Path;

/// A GeoPackage is itself a SQLite database: layers live in
/// `gpkg_contents`/`gpkg_geometry_columns`, geometry is stored as a
/// GeoPackage binary blob (a small header in front of a standard WKB body).
/// Opened on its own connection rather than the app pool, since this file
/// is read once per import and then discarded.
pub struct GpkgReader {
    conn: Connection,
}

struct LayerMeta {
    table_name: String,
    geometry_column: String,
}

impl GpkgReader {
    pub fn open(path: &Path) -> AppResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| AppError::InvalidFile(format!("not a valid GeoPackage: {}", e)))?;

        let check: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='gpkg_contents'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| AppError::InvalidFile(format!("not a GeoPackage: {}", e)))?;

        if check == 0 {
            return Err(AppError::InvalidFile(
                "file has no gpkg_contents table".to_string(),
            ));
        }

        Ok(Self { conn })
    }

    pub fn layers(&self) -> AppResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name FROM gpkg_contents WHERE data_type = 'features'",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn layer_meta(&self, layer: &str) -> AppResult<LayerMeta> {
        let geometry_column: String = self
            .conn
            .query_row(
                "SELECT column_name FROM gpkg_geometry_columns WHERE table_name = ?",
                [layer],
                |row| row.get(0),
            )
            .map_err(|_| AppError::LayerNotFound(layer.to_string()))?;

        Ok(LayerMeta {
            table_name: layer.to_string(),
            geometry_column,
        })
    }

    pub fn feature_count(&self, layer: &str) -> AppResult<i64> {
        let meta = self.layer_meta(layer)?;
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", meta.table_name);
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    pub fn features(&self, layer: &str) -> AppResult<Vec<RawFeature>> {
        let meta = self.layer_meta(layer)?;
        let sql = format!(
            "SELECT rowid, \"{}\" FROM \"{}\"",
            meta.geometry_column, meta.table_name
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let rowid: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((rowid, blob))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (rowid, blob) = row?;
            let geometry = decode_gpkg_geometry(&blob)?;
            out.push(RawFeature {
                id: Some(rowid.to_string()),
                geometry,
                properties: serde_json::Value::Object(Default::default()),
            });
        }
        Ok(out)
    }
}

/// Strips the GeoPackage binary header (magic `GP`, version, flags, and an
/// optional envelope) and decodes the remaining standard WKB body.
fn decode_gpkg_geometry(blob: &[u8]) -> AppResult<geo_types::Geometry<f64>> {
    if blob.len() < 8 || &blob[0..2] != b"GP" {
        return Err(AppError::CorruptedGeometry(
            "missing GeoPackage binary header magic".to_string(),
        ));
    }

    let flags = blob[3];
    let is_little_endian = flags & 0x01 != 0;
    let envelope_indicator = (flags >> 1) & 0x07;

    let envelope_len: usize = match envelope_indicator {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => {
            return Err(AppError::CorruptedGeometry(format!(
                "invalid envelope indicator {}",
                other
            )))
        }
    };

    let wkb_start = 8 + envelope_len;
    if blob.len() <= wkb_start {
        return Err(AppError::CorruptedGeometry(
            "blob too short for its declared envelope".to_string(),
        ));
    }

    let wkb_body = &blob[wkb_start..];
    let _ = is_little_endian; // WKB body carries its own byte-order marker
    let mut cursor = Cursor::new(wkb_body);

    wkb::wkb_to_geom(&mut cursor)
        .map_err(|_| AppError::CorruptedGeometry("failed to decode WKB body".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_gpkg_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"not a database").unwrap();

        let result = GpkgReader::open(tmp.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_short_blob() {
        let result = decode_gpkg_geometry(b"short");
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let result = decode_gpkg_geometry(b"XXshortheaderdata");
        assert!(result.is_err());
    }
}
