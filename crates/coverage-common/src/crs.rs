//! Coordinate Reference System types and the geodesy collaborator.
//!
//! The catalog stores CRS definitions as text (an EPSG code or WKT carrying
//! an `AUTHORITY["EPSG", "..."]` clause). `Geodesy` turns those definitions
//! into `Crs` values and builds transforms between them. `BasicGeodesy`
//! covers the geographic and Web Mercator systems found in the catalog.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use crate::bbox::BoundingBox;
use crate::error::{CatalogError, CatalogResult};

/// Well-known CRS codes understood by `BasicGeodesy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// NAD83 Geographic, treated as WGS84
    Epsg4269,
    /// Web Mercator (meters)
    Epsg3857,
}

impl CrsCode {
    /// Parse a code string such as "EPSG:4326", "epsg:3857" or "CRS:84".
    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "EPSG:4326" | "CRS:84" | "4326" => Some(CrsCode::Epsg4326),
            "EPSG:4269" | "4269" => Some(CrsCode::Epsg4269),
            "EPSG:3857" | "EPSG:900913" | "3857" => Some(CrsCode::Epsg3857),
            _ => None,
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326 | CrsCode::Epsg4269)
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            CrsCode::Epsg4326 => "EPSG:4326",
            CrsCode::Epsg4269 => "EPSG:4269",
            CrsCode::Epsg3857 => "EPSG:3857",
        };
        write!(f, "{}", code)
    }
}

/// A resolved coordinate reference system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    /// Name under which the catalog stores the definition.
    pub name: String,
    pub code: CrsCode,
}

impl Crs {
    pub fn new(name: impl Into<String>, code: CrsCode) -> Self {
        Self {
            name: name.into(),
            code,
        }
    }

    /// WGS84 geographic, the usual table CRS.
    pub fn wgs84() -> Self {
        Self::new("WGS84", CrsCode::Epsg4326)
    }

    /// Valid bounds in the units of this CRS.
    pub fn valid_bounds(&self) -> BoundingBox {
        match self.code {
            CrsCode::Epsg4326 | CrsCode::Epsg4269 => BoundingBox::world(),
            CrsCode::Epsg3857 => BoundingBox::new(
                -MERCATOR_EXTENT,
                -MERCATOR_EXTENT,
                MERCATOR_EXTENT,
                MERCATOR_EXTENT,
            ),
        }
    }
}

/// A two-dimensional coordinate operation.
pub trait CoordinateTransform: Send + Sync + fmt::Debug {
    /// Transform a single point.
    fn transform_point(&self, x: f64, y: f64) -> CatalogResult<(f64, f64)>;

    /// True when the transform leaves coordinates unchanged.
    fn is_identity(&self) -> bool {
        false
    }

    /// Transform a box by densifying its edges and taking the extent of the
    /// transformed points.
    fn transform_bbox(&self, bbox: &BoundingBox) -> CatalogResult<BoundingBox> {
        if self.is_identity() {
            return Ok(*bbox);
        }
        let mut result: Option<BoundingBox> = None;
        for i in 0..=DENSIFY_POINTS {
            let t = i as f64 / DENSIFY_POINTS as f64;
            let x = bbox.min_x + t * bbox.width();
            let y = bbox.min_y + t * bbox.height();
            for (px, py) in [(x, bbox.min_y), (x, bbox.max_y), (bbox.min_x, y), (bbox.max_x, y)] {
                let (tx, ty) = self.transform_point(px, py)?;
                let point = BoundingBox::new(tx, ty, tx, ty);
                result = Some(match result {
                    Some(r) => r.union(&point),
                    None => point,
                });
            }
        }
        result.ok_or_else(|| CatalogError::illegal_state("empty transform result"))
    }
}

/// Points sampled along each edge by `transform_bbox`.
const DENSIFY_POINTS: usize = 20;

const EARTH_RADIUS: f64 = 6_378_137.0;
const MERCATOR_EXTENT: f64 = 20_037_508.342_789_244;
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// The geodesy collaborator.
pub trait Geodesy: Send + Sync {
    /// Build a CRS from a stored definition (code or WKT).
    fn parse_crs(&self, name: &str, definition: &str) -> CatalogResult<Crs>;

    /// Build the operation converting coordinates from `source` to `target`.
    fn transform(&self, source: &Crs, target: &Crs) -> CatalogResult<Arc<dyn CoordinateTransform>>;
}

/// Geodesy for geographic and Web Mercator systems.
#[derive(Debug, Default, Clone)]
pub struct BasicGeodesy;

impl Geodesy for BasicGeodesy {
    fn parse_crs(&self, name: &str, definition: &str) -> CatalogResult<Crs> {
        if let Some(code) = CrsCode::from_code(definition) {
            return Ok(Crs::new(name, code));
        }
        authority_code(definition)
            .and_then(|code| CrsCode::from_code(&code))
            .map(|code| Crs::new(name, code))
            .ok_or_else(|| {
                CatalogError::invalid_record("crs", format!("unsupported CRS definition for '{}'", name))
            })
    }

    fn transform(&self, source: &Crs, target: &Crs) -> CatalogResult<Arc<dyn CoordinateTransform>> {
        let transform: Arc<dyn CoordinateTransform> = match (source.code.is_geographic(), target.code.is_geographic()) {
            (true, true) => Arc::new(IdentityTransform),
            (false, false) => Arc::new(IdentityTransform),
            (true, false) => Arc::new(MercatorTransform { inverse: false }),
            (false, true) => Arc::new(MercatorTransform { inverse: true }),
        };
        Ok(transform)
    }
}

/// Extract the last `AUTHORITY["EPSG","code"]` clause of a WKT string.
fn authority_code(wkt: &str) -> Option<String> {
    let start = wkt.rfind("AUTHORITY[")?;
    let clause = &wkt[start + "AUTHORITY[".len()..];
    let end = clause.find(']')?;
    let mut parts = clause[..end].split(',').map(|p| p.trim().trim_matches('"'));
    let authority = parts.next()?;
    let code = parts.next()?;
    Some(format!("{}:{}", authority, code))
}

#[derive(Debug, Clone, Copy)]
pub struct IdentityTransform;

impl CoordinateTransform for IdentityTransform {
    fn transform_point(&self, x: f64, y: f64) -> CatalogResult<(f64, f64)> {
        Ok((x, y))
    }

    fn is_identity(&self) -> bool {
        true
    }
}

/// Spherical Web Mercator, forward (degrees to meters) or inverse.
#[derive(Debug, Clone, Copy)]
pub struct MercatorTransform {
    inverse: bool,
}

impl CoordinateTransform for MercatorTransform {
    fn transform_point(&self, x: f64, y: f64) -> CatalogResult<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return Err(CatalogError::illegal_state(format!(
                "can not transform non-finite point ({}, {})",
                x, y
            )));
        }
        if self.inverse {
            let lon = x / EARTH_RADIUS * 180.0 / PI;
            let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0) * 180.0 / PI;
            Ok((lon, lat))
        } else {
            let lat = y.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT);
            let mx = x * PI / 180.0 * EARTH_RADIUS;
            let my = ((90.0 + lat) * PI / 360.0).tan().ln() * EARTH_RADIUS;
            Ok((mx, my))
        }
    }
}
