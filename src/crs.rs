use crate::error::{AppError, AppResult};
use geo_types::{Coord, Geometry, LineString, Point, Polygon};

/// The closed set of coordinate reference systems this pipeline accepts.
/// JGD2011 plane rectangular zones (1-19) are the Japanese survey grid;
/// everything else is rejected rather than passed through a general PROJ
/// pipeline, since the set of systems this system needs to support is small
/// and fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizedCrs {
    Wgs84,
    WebMercator,
    Jgd2011Zone(u8),
}

const EARTH_RADIUS_WEB_MERCATOR: f64 = 6378137.0;

/// Origins (lat0, lon0) for JGD2011 plane rectangular coordinate system
/// zones I-XIX, per the Japanese Geospatial Information Authority standard.
const JGD2011_ZONE_ORIGINS: [(f64, f64); 19] = [
    (33.0, 129.5),
    (33.0, 131.0),
    (36.0, 132.166666667),
    (33.0, 133.5),
    (36.0, 134.333333333),
    (36.0, 136.0),
    (36.0, 137.166666667),
    (36.0, 138.5),
    (36.0, 139.833333333),
    (40.0, 140.833333333),
    (44.0, 140.25),
    (44.0, 142.25),
    (44.0, 144.25),
    (26.0, 142.0),
    (26.0, 127.5),
    (26.0, 124.0),
    (26.0, 131.0),
    (20.0, 136.0),
    (26.0, 154.0),
];

const JGD2011_SCALE_FACTOR: f64 = 0.9999;
const GRS80_SEMI_MAJOR: f64 = 6378137.0;
const GRS80_FLATTENING_INV: f64 = 298.257222101;

impl RecognizedCrs {
    pub fn parse(code: &str) -> AppResult<Self> {
        let normalized = code.trim().to_uppercase();
        match normalized.as_str() {
            "WGS84" | "CRS84" | "EPSG:4326" | "URN:OGC:DEF:CRS:OGC:1.3:CRS84" => Ok(Self::Wgs84),
            "EPSG:3857" | "WEB_MERCATOR" | "WEBMERCATOR" => Ok(Self::WebMercator),
            other => {
                if let Some(zone) = other.strip_prefix("JGD2011:") {
                    let zone: u8 = zone
                        .parse()
                        .map_err(|_| AppError::UnsupportedCrs(code.to_string()))?;
                    if (1..=19).contains(&zone) {
                        Ok(Self::Jgd2011Zone(zone))
                    } else {
                        Err(AppError::UnsupportedCrs(code.to_string()))
                    }
                } else {
                    Err(AppError::UnsupportedCrs(code.to_string()))
                }
            }
        }
    }

    pub fn is_wgs84(&self) -> bool {
        matches!(self, Self::Wgs84)
    }
}

fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS_WEB_MERCATOR).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS_WEB_MERCATOR).exp().atan() - std::f64::consts::FRAC_PI_2)
        .to_degrees();
    (lon, lat)
}

/// Transverse Mercator forward projection is not invertible in closed form
/// without a series expansion; this uses the standard iterative inverse
/// (Krüger series, 4th order) against the GRS80 ellipsoid used by JGD2011.
fn jgd2011_zone_to_wgs84(x: f64, y: f64, zone: u8) -> AppResult<(f64, f64)> {
    let (lat0, lon0) = JGD2011_ZONE_ORIGINS
        .get(zone as usize - 1)
        .copied()
        .ok_or_else(|| AppError::UnsupportedCrs(format!("JGD2011:{}", zone)))?;

    let a = GRS80_SEMI_MAJOR;
    let f = 1.0 / GRS80_FLATTENING_INV;
    let n = f / (2.0 - f);
    let m0 = a / (1.0 + n) * (1.0 + n.powi(2) / 4.0 + n.powi(4) / 64.0) * lat0.to_radians();

    let m = y / JGD2011_SCALE_FACTOR + m0;
    let a_bar = a / (1.0 + n) * (1.0 + n.powi(2) / 4.0 + n.powi(4) / 64.0);
    let xi = m / a_bar;

    let beta = [
        n / 2.0 - (2.0 / 3.0) * n.powi(2) + (37.0 / 96.0) * n.powi(3),
        (1.0 / 48.0) * n.powi(2) + (1.0 / 15.0) * n.powi(3),
        (17.0 / 480.0) * n.powi(3),
    ];

    let mut xi_prime = xi;
    for (i, b) in beta.iter().enumerate() {
        xi_prime -= b * (2.0 * (i as f64 + 1.0) * xi).sin();
    }

    let eta_prime = x / (JGD2011_SCALE_FACTOR * a_bar);

    let chi = xi_prime.sin().atan2(eta_prime.cosh() * xi_prime.cos());
    let lat_rad = chi
        + (n / 2.0 - (2.0 / 3.0) * n.powi(2) + (37.0 / 96.0) * n.powi(3)) * (2.0 * chi).sin()
        + ((1.0 / 48.0) * n.powi(2) + (1.0 / 15.0) * n.powi(3)) * (4.0 * chi).sin()
        + (17.0 / 480.0) * n.powi(3) * (6.0 * chi).sin();

    let lon_rad = eta_prime.sinh().atan2(xi_prime.cos()) + lon0.to_radians();

    Ok((lon_rad.to_degrees(), lat_rad.to_degrees()))
}

fn transform_point(x: f64, y: f64, crs: RecognizedCrs) -> AppResult<(f64, f64)> {
    match crs {
        RecognizedCrs::Wgs84 => Ok((x, y)),
        RecognizedCrs::WebMercator => Ok(web_mercator_to_wgs84(x, y)),
        RecognizedCrs::Jgd2011Zone(zone) => jgd2011_zone_to_wgs84(x, y, zone),
    }
}

fn transform_coord(coord: Coord<f64>, crs: RecognizedCrs) -> AppResult<Coord<f64>> {
    let (lon, lat) = transform_point(coord.x, coord.y, crs)?;
    Ok(Coord { x: lon, y: lat })
}

pub fn transform_geometry(geometry: &Geometry<f64>, crs: RecognizedCrs) -> AppResult<Geometry<f64>> {
    if crs.is_wgs84() {
        return Ok(geometry.clone());
    }

    match geometry {
        Geometry::Point(p) => {
            let (lon, lat) = transform_point(p.x(), p.y(), crs)?;
            Ok(Geometry::Point(Point::new(lon, lat)))
        }
        Geometry::LineString(ls) => {
            let coords: AppResult<Vec<Coord<f64>>> = ls
                .coords()
                .map(|c| transform_coord(*c, crs))
                .collect();
            Ok(Geometry::LineString(LineString::new(coords?)))
        }
        Geometry::MultiLineString(mls) => {
            let lines: AppResult<Vec<LineString<f64>>> = mls
                .iter()
                .map(|ls| {
                    let coords: AppResult<Vec<Coord<f64>>> =
                        ls.coords().map(|c| transform_coord(*c, crs)).collect();
                    Ok(LineString::new(coords?))
                })
                .collect();
            Ok(Geometry::MultiLineString(geo_types::MultiLineString::new(
                lines?,
            )))
        }
        Geometry::Polygon(poly) => Ok(Geometry::Polygon(transform_polygon(poly, crs)?)),
        other => Err(AppError::CorruptedGeometry(format!(
            "unsupported geometry kind for CRS transform: {:?}",
            std::mem::discriminant(other)
        ))),
    }
}

fn transform_polygon(poly: &Polygon<f64>, crs: RecognizedCrs) -> AppResult<Polygon<f64>> {
    let exterior: AppResult<Vec<Coord<f64>>> = poly
        .exterior()
        .coords()
        .map(|c| transform_coord(*c, crs))
        .collect();

    let interiors: AppResult<Vec<LineString<f64>>> = poly
        .interiors()
        .iter()
        .map(|ring| {
            let coords: AppResult<Vec<Coord<f64>>> =
                ring.coords().map(|c| transform_coord(*c, crs)).collect();
            Ok(LineString::new(coords?))
        })
        .collect();

    Ok(Polygon::new(LineString::new(exterior?), interiors?))
}

pub fn transform_bbox(
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    crs: RecognizedCrs,
) -> AppResult<(f64, f64, f64, f64)> {
    let (lon1, lat1) = transform_point(min_x, min_y, crs)?;
    let (lon2, lat2) = transform_point(max_x, max_y, crs)?;
    Ok((lon1.min(lon2), lat1.min(lat2), lon1.max(lon2), lat1.max(lat2)))
}
