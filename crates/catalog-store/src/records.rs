//! Rows of the catalog tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use coverage_common::{BoundingBox, TimeRange};

/// A series of images sharing a directory and a default format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRecord {
    pub name: String,
    /// Directory relative to the root directory or URL.
    pub path: String,
    pub format: String,
}

/// An image format and how its samples are interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatRecord {
    pub name: String,
    pub mime_type: String,
    pub extension: String,
    /// True when stored samples are already geophysical values.
    pub geophysics: bool,
}

/// One band (sample dimension) of a format. `band` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandRecord {
    pub id: i64,
    pub format: String,
    pub band: i32,
    pub name: String,
    pub units: Option<String>,
}

/// A decode rule covering the sample range `[lower, upper]` of one band.
///
/// Quantitative categories carry `c0` (offset) and `c1` (scale); the
/// geophysical value is `c0 + c1 * sample`, or `10^(c0 + c1 * sample)` when
/// `log` is set. Qualitative categories leave both coefficients empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub band_id: i64,
    pub name: String,
    pub lower: i32,
    pub upper: i32,
    pub c0: Option<f64>,
    pub c1: Option<f64>,
    pub log: bool,
    pub colors: Option<String>,
}

/// A stored CRS definition (EPSG code or WKT).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrsRecord {
    pub name: String,
    pub definition: String,
}

/// One storable raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRecord {
    pub series: String,
    pub subseries: String,
    pub filename: String,
    /// Image index inside the file.
    pub index: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub bbox: BoundingBox,
    pub width: i32,
    pub height: i32,
    pub crs: String,
    pub format: String,
}

impl CoverageRecord {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    /// Check the record against a query's spatio-temporal predicates.
    pub fn matches(&self, query: &CoverageQuery) -> bool {
        if let Some(series) = &query.series {
            if series != &self.series {
                return false;
            }
        }
        self.time_range().intersects(&query.time_range) && self.bbox.intersection(&query.bbox).is_some()
    }
}

/// A named input of a linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorRecord {
    pub id: i64,
    pub name: String,
    pub phenomenon: String,
    pub procedure: String,
    pub band: i16,
    /// Temporal offset in days.
    pub dt: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub distribution: String,
}

/// One term of the linear model computing `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModelRecord {
    pub target: String,
    pub coefficient: f64,
    /// Descriptor names multiplied together, in order.
    pub descriptors: Vec<String>,
}

/// Query parameters for finding coverages.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageQuery {
    /// `None` matches every series.
    pub series: Option<String>,
    pub time_range: TimeRange,
    pub bbox: BoundingBox,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> CoverageRecord {
        CoverageRecord {
            series: "SST".to_string(),
            subseries: "daily".to_string(),
            filename: "2003-06-01".to_string(),
            index: 0,
            start_time: Utc.with_ymd_and_hms(2003, 6, 1, 0, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2003, 6, 2, 0, 0, 0).unwrap(),
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            width: 100,
            height: 100,
            crs: "WGS84".to_string(),
            format: "PNG".to_string(),
        }
    }

    #[test]
    fn test_matches_series_and_extent() {
        let r = record();
        let mut query = CoverageQuery {
            series: Some("SST".to_string()),
            time_range: TimeRange::instant(Utc.with_ymd_and_hms(2003, 6, 1, 12, 0, 0).unwrap()),
            bbox: BoundingBox::new(5.0, 5.0, 5.0, 5.0),
        };
        assert!(r.matches(&query));

        query.series = Some("CHL".to_string());
        assert!(!r.matches(&query));

        query.series = None;
        query.bbox = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert!(!r.matches(&query));
    }
}
