//! Decoded coverages in geophysical units.

use std::sync::Arc;

use coverage_common::{BoundingBox, CatalogError, CatalogResult, Crs, TimeRange};

use crate::category::SampleDimension;
use crate::raster::RasterImage;

/// A raster whose samples are geophysical values.
///
/// Values are `f32`, band-interleaved by pixel, rows top to bottom. Samples
/// outside every quantitative category are NaN.
#[derive(Debug, Clone)]
pub struct GridCoverage {
    pub name: String,
    /// Extent of the pixels actually read, in `crs` units.
    pub bbox: BoundingBox,
    pub crs: Crs,
    pub time_range: TimeRange,
    pub width: u32,
    pub height: u32,
    pub bands: Arc<[SampleDimension]>,
    pub values: Vec<f32>,
    band_count: usize,
}

impl GridCoverage {
    /// Interpret raw pixels through the declared bands.
    ///
    /// A format declaring no bands, or flagged as geophysical, passes the
    /// samples through unchanged. The coverage does not keep `raw`.
    pub fn from_raster(
        name: impl Into<String>,
        raw: &RasterImage,
        bands: Arc<[SampleDimension]>,
        geophysics: bool,
        bbox: BoundingBox,
        crs: Crs,
        time_range: TimeRange,
    ) -> CatalogResult<Self> {
        let name = name.into();
        let band_count = raw.bands as usize;
        if band_count == 0 {
            return Err(CatalogError::Decode(format!("'{}' was decoded without any band", name)));
        }
        let passthrough = geophysics || bands.is_empty();
        if !passthrough && bands.len() != band_count {
            return Err(CatalogError::invalid_record(
                "bands",
                format!(
                    "'{}' has {} bands but its format declares {}",
                    name,
                    band_count,
                    bands.len()
                ),
            ));
        }

        let len = raw.pixels.len();
        let values = (0..len)
            .map(|i| {
                let sample = raw.pixels.get(i).unwrap_or(f64::NAN);
                if passthrough {
                    sample as f32
                } else {
                    bands[i % band_count].geophysics(sample) as f32
                }
            })
            .collect();

        Ok(Self {
            name,
            bbox,
            crs,
            time_range,
            width: raw.width,
            height: raw.height,
            bands,
            values,
            band_count,
        })
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    /// Geophysical value at column `x`, row `y`.
    pub fn value(&self, x: u32, y: u32, band: usize) -> Option<f32> {
        if x >= self.width || y >= self.height || band >= self.band_count() {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * self.band_count() + band;
        self.values.get(i).copied()
    }

    /// Value at a coordinate in `crs` units, nearest pixel.
    pub fn value_at(&self, x: f64, y: f64, band: usize) -> Option<f32> {
        if !self.bbox.contains_point(x, y) || self.bbox.width() <= 0.0 || self.bbox.height() <= 0.0 {
            return None;
        }
        let col = ((x - self.bbox.min_x) / self.bbox.width() * self.width as f64).floor() as u32;
        let row = ((self.bbox.max_y - y) / self.bbox.height() * self.height as f64).floor() as u32;
        self.value(col.min(self.width - 1), row.min(self.height - 1), band)
    }

    /// Bytes held by the geophysical values.
    pub fn byte_size(&self) -> usize {
        self.values.len() * std::mem::size_of::<f32>()
    }

    /// Minimum and maximum of the non-NaN values of a band.
    pub fn value_range(&self, band: usize) -> Option<(f32, f32)> {
        let bands = self.band_count();
        if band >= bands {
            return None;
        }
        self.values
            .iter()
            .skip(band)
            .step_by(bands)
            .filter(|v| !v.is_nan())
            .fold(None, |range, &v| match range {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
