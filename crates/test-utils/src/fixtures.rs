//! Common catalog fixtures for coverage tests.
//!
//! The default fixture describes one series, "SST", stored as 8-bit PNG
//! images under `sst/`. Sample 0 is "no data"; samples 1 to 255 map to
//! `-2 + 0.1 * sample` degrees Celsius.

use chrono::{DateTime, Duration, TimeZone, Utc};

use catalog_store::{
    BandRecord, CategoryRecord, CoverageRecord, CrsRecord, DescriptorRecord, FormatRecord,
    LinearModelRecord, MemoryCatalogStore, SeriesRecord,
};
use coverage_common::BoundingBox;

pub const SST_SERIES: &str = "SST";
pub const SST_PATH: &str = "sst";
pub const PNG_FORMAT: &str = "PNG";
pub const WGS84: &str = "WGS84";
pub const MERCATOR: &str = "Mercator";

/// Offset and scale of the SST band.
pub const SST_OFFSET: f64 = -2.0;
pub const SST_SCALE: f64 = 0.1;

/// Common bounding boxes.
pub mod bbox {
    use coverage_common::BoundingBox;

    /// The 10° square most fixtures cover.
    pub const SQUARE: BoundingBox = BoundingBox {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 10.0,
        max_y: 10.0,
    };

    /// A box disjoint from `SQUARE`.
    pub const DISJOINT: BoundingBox = BoundingBox {
        min_x: 20.0,
        min_y: 20.0,
        max_x: 30.0,
        max_y: 30.0,
    };

    /// Continental United States bounding box
    pub const CONUS: BoundingBox = BoundingBox {
        min_x: -130.0,
        min_y: 20.0,
        max_x: -60.0,
        max_y: 55.0,
    };
}

/// Midnight UTC of a day in January 2000.
pub fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap() + Duration::days(n as i64 - 1)
}

pub fn sst_series() -> SeriesRecord {
    SeriesRecord {
        name: SST_SERIES.to_string(),
        path: SST_PATH.to_string(),
        format: PNG_FORMAT.to_string(),
    }
}

pub fn png_format() -> FormatRecord {
    FormatRecord {
        name: PNG_FORMAT.to_string(),
        mime_type: "image/png".to_string(),
        extension: "png".to_string(),
        geophysics: false,
    }
}

pub fn band(id: i64, format: &str, number: i32, name: &str) -> BandRecord {
    BandRecord {
        id,
        format: format.to_string(),
        band: number,
        name: name.to_string(),
        units: Some("°C".to_string()),
    }
}

pub fn nodata_category(band_id: i64) -> CategoryRecord {
    CategoryRecord {
        band_id,
        name: "no data".to_string(),
        lower: 0,
        upper: 0,
        c0: None,
        c1: None,
        log: false,
        colors: Some("#000000".to_string()),
    }
}

pub fn linear_category(band_id: i64, lower: i32, upper: i32, offset: f64, scale: f64) -> CategoryRecord {
    CategoryRecord {
        band_id,
        name: "values".to_string(),
        lower,
        upper,
        c0: Some(offset),
        c1: Some(scale),
        log: false,
        colors: Some("#0000FF..#FF0000".to_string()),
    }
}

pub fn crs(name: &str, definition: &str) -> CrsRecord {
    CrsRecord {
        name: name.to_string(),
        definition: definition.to_string(),
    }
}

/// An SST coverage record valid for one day.
pub fn coverage(filename: &str, day_number: u32, bbox: BoundingBox, width: i32, height: i32) -> CoverageRecord {
    CoverageRecord {
        series: SST_SERIES.to_string(),
        subseries: "daily".to_string(),
        filename: filename.to_string(),
        index: 0,
        start_time: day(day_number),
        end_time: day(day_number + 1),
        bbox,
        width,
        height,
        crs: WGS84.to_string(),
        format: PNG_FORMAT.to_string(),
    }
}

pub fn descriptor(id: i64, name: &str, distribution: &str) -> DescriptorRecord {
    DescriptorRecord {
        id,
        name: name.to_string(),
        phenomenon: name.to_string(),
        procedure: "mean".to_string(),
        band: 1,
        dt: 0.0,
        dx: 0.0,
        dy: 0.0,
        dz: 0.0,
        distribution: distribution.to_string(),
    }
}

pub fn linear_term(target: &str, coefficient: f64, descriptors: &[&str]) -> LinearModelRecord {
    LinearModelRecord {
        target: target.to_string(),
        coefficient,
        descriptors: descriptors.iter().map(|d| d.to_string()).collect(),
    }
}

/// The SST series, its PNG format with one band, and the CRS definitions.
/// No coverages.
pub fn sst_catalog() -> MemoryCatalogStore {
    MemoryCatalogStore::new()
        .with_series(sst_series())
        .with_format(png_format())
        .with_band(band(1, PNG_FORMAT, 1, "sst"))
        .with_category(nodata_category(1))
        .with_category(linear_category(1, 1, 255, SST_OFFSET, SST_SCALE))
        .with_crs(crs(WGS84, "EPSG:4326"))
        .with_crs(crs(MERCATOR, "EPSG:3857"))
}

/// Geophysical value of an SST sample.
pub fn sst_value(sample: u8) -> Option<f64> {
    (sample > 0).then(|| SST_OFFSET + SST_SCALE * sample as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_store::CatalogStore;

    #[test]
    fn test_days_are_consecutive() {
        assert_eq!(day(2) - day(1), Duration::days(1));
        assert_eq!(day(1), Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_sst_value() {
        assert_eq!(sst_value(0), None);
        assert_eq!(sst_value(20), Some(0.0));
    }

    #[tokio::test]
    async fn test_sst_catalog_has_one_band() {
        let store = sst_catalog();
        let bands = store.bands(PNG_FORMAT).await.unwrap();
        assert_eq!(bands.len(), 1);
        assert_eq!(store.categories(1).await.unwrap().len(), 2);
        assert_eq!(store.series(SST_SERIES).await.unwrap().path, SST_PATH);
    }
}
