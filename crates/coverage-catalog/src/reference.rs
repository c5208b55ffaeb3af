//! Coverage references: the catalog's identification of one raster.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use catalog_store::CoverageRecord;
use coverage_common::{BoundingBox, CatalogError, Envelope, TimeRange};

/// Identifies one storable raster. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReference {
    pub series: String,
    pub subseries: String,
    pub filename: String,
    pub image_index: u32,
    pub time_range: TimeRange,
    /// Extent in the table CRS.
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
    pub crs: String,
    pub format: String,
}

impl CoverageReference {
    /// Name used by `CoverageTable::entry_named`.
    pub fn name(&self) -> &str {
        &self.filename
    }

    pub fn envelope(&self) -> Envelope {
        Envelope::new(self.bbox, self.time_range)
    }

    /// Cell size in table units per pixel.
    pub fn resolution(&self) -> (f64, f64) {
        (
            self.bbox.width() / self.width as f64,
            self.bbox.height() / self.height as f64,
        )
    }

    /// The record this reference was built from.
    pub fn to_record(&self) -> CoverageRecord {
        CoverageRecord {
            series: self.series.clone(),
            subseries: self.subseries.clone(),
            filename: self.filename.clone(),
            index: self.image_index as i32,
            start_time: self.time_range.start,
            end_time: self.time_range.end,
            bbox: self.bbox,
            width: self.width as i32,
            height: self.height as i32,
            crs: self.crs.clone(),
            format: self.format.clone(),
        }
    }

    fn identity(&self) -> (&str, &str, &str, u32, &TimeRange, [u64; 4], u32, u32, &str, &str) {
        (
            &self.series,
            &self.subseries,
            &self.filename,
            self.image_index,
            &self.time_range,
            self.bbox.to_bits(),
            self.width,
            self.height,
            &self.crs,
            &self.format,
        )
    }
}

impl TryFrom<CoverageRecord> for CoverageReference {
    type Error = CatalogError;

    fn try_from(record: CoverageRecord) -> Result<Self, Self::Error> {
        let invalid = |message: String| CatalogError::invalid_record("coverages", message);
        if record.width <= 0 || record.height <= 0 {
            return Err(invalid(format!(
                "coverage '{}' has size {}x{}",
                record.filename, record.width, record.height
            )));
        }
        if record.index < 0 {
            return Err(invalid(format!(
                "coverage '{}' has negative image index {}",
                record.filename, record.index
            )));
        }
        if record.end_time < record.start_time {
            return Err(invalid(format!("coverage '{}' has an inverted time range", record.filename)));
        }
        if record.bbox.is_empty() {
            return Err(invalid(format!("coverage '{}' has an empty bounding box", record.filename)));
        }

        Ok(Self {
            time_range: record.time_range(),
            series: record.series,
            subseries: record.subseries,
            filename: record.filename,
            image_index: record.index as u32,
            bbox: record.bbox,
            width: record.width as u32,
            height: record.height as u32,
            crs: record.crs,
            format: record.format,
        })
    }
}

impl PartialEq for CoverageReference {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for CoverageReference {}

impl Hash for CoverageReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Display for CoverageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.series, self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record() -> CoverageRecord {
        CoverageRecord {
            series: "SST".to_string(),
            subseries: "daily".to_string(),
            filename: "198601".to_string(),
            index: 0,
            start_time: Utc.with_ymd_and_hms(1986, 1, 1, 0, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(1986, 1, 2, 0, 0, 0).unwrap(),
            bbox: BoundingBox::new(-20.0, 10.0, 40.0, 50.0),
            width: 600,
            height: 400,
            crs: "WGS84".to_string(),
            format: "PNG".to_string(),
        }
    }

    #[test]
    fn test_record_round_trip() {
        let reference = CoverageReference::try_from(record()).unwrap();
        assert_eq!(reference.to_record(), record());
        assert_eq!(reference.resolution(), (0.1, 0.1));
        assert_eq!(reference.to_string(), "SST:198601");
    }

    #[test]
    fn test_equal_fields_are_equal() {
        let a = CoverageReference::try_from(record()).unwrap();
        let b = CoverageReference::try_from(record()).unwrap();
        assert_eq!(a, b);

        let mut other = record();
        other.bbox.max_x = 40.5;
        assert_ne!(a, CoverageReference::try_from(other).unwrap());
    }

    #[test]
    fn test_invalid_records() {
        let mut bad = record();
        bad.width = 0;
        assert!(CoverageReference::try_from(bad).is_err());

        let mut bad = record();
        bad.end_time = bad.start_time - chrono::Duration::days(1);
        assert!(CoverageReference::try_from(bad).is_err());
    }
}
