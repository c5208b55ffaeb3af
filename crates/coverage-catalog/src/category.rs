//! Sample dimensions and their decode categories.
//!
//! A category maps an inclusive range of raw sample values either to
//! geophysical values (quantitative, through a transform) or to a named
//! class (qualitative). Categories of one band never overlap.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use image::Rgba;
use serde::Serialize;

use catalog_store::{BandRecord, CategoryRecord};
use coverage_common::{CatalogError, CatalogResult};

/// A one-dimensional transform from raw samples to geophysical values.
pub trait SampleTransform: Send + Sync + fmt::Debug {
    fn apply(&self, value: f64) -> f64;
}

/// `offset + scale * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTransform {
    pub offset: f64,
    pub scale: f64,
}

impl SampleTransform for LinearTransform {
    fn apply(&self, value: f64) -> f64 {
        self.offset + self.scale * value
    }
}

/// `10^x`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exp10Transform;

impl SampleTransform for Exp10Transform {
    fn apply(&self, value: f64) -> f64 {
        10f64.powf(value)
    }
}

/// `second(first(x))`.
#[derive(Debug, Clone)]
pub struct ConcatenatedTransform {
    pub first: Arc<dyn SampleTransform>,
    pub second: Arc<dyn SampleTransform>,
}

impl SampleTransform for ConcatenatedTransform {
    fn apply(&self, value: f64) -> f64 {
        self.second.apply(self.first.apply(value))
    }
}

#[derive(Debug, Clone)]
pub enum CategoryKind {
    Quantitative {
        transform: Arc<dyn SampleTransform>,
        logarithmic: bool,
    },
    Qualitative,
}

#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub range: RangeInclusive<i32>,
    pub kind: CategoryKind,
    pub colors: Vec<Rgba<u8>>,
}

impl Category {
    /// Build a category from its record. `exp10` is shared by every
    /// logarithmic category of a catalog.
    pub fn from_record(
        record: &CategoryRecord,
        exp10: impl FnOnce() -> Arc<dyn SampleTransform>,
    ) -> CatalogResult<Self> {
        if record.lower > record.upper {
            return Err(CatalogError::invalid_record(
                "categories",
                format!("category '{}' has an inverted range", record.name),
            ));
        }
        let span = i64::from(record.upper) - i64::from(record.lower) + 1;
        let count = usize::try_from(span).unwrap_or(MAX_PALETTE_COLORS);
        let colors = match &record.colors {
            Some(palette) => parse_palette(palette, count)?,
            None => Vec::new(),
        };

        let kind = match (record.c0, record.c1) {
            (Some(offset), Some(scale)) => {
                let linear: Arc<dyn SampleTransform> = Arc::new(LinearTransform { offset, scale });
                let transform = if record.log {
                    Arc::new(ConcatenatedTransform {
                        first: linear,
                        second: exp10(),
                    })
                } else {
                    linear
                };
                CategoryKind::Quantitative {
                    transform,
                    logarithmic: record.log,
                }
            }
            (None, None) => CategoryKind::Qualitative,
            _ => {
                return Err(CatalogError::invalid_record(
                    "categories",
                    format!("category '{}' has only one coefficient", record.name),
                ))
            }
        };

        Ok(Self {
            name: record.name.clone(),
            range: record.lower..=record.upper,
            kind,
            colors,
        })
    }

    pub fn is_quantitative(&self) -> bool {
        matches!(self.kind, CategoryKind::Quantitative { .. })
    }

    /// Geophysical value of a raw sample. Qualitative classes map to NaN.
    pub fn geophysics(&self, sample: f64) -> f64 {
        match &self.kind {
            CategoryKind::Quantitative { transform, .. } => transform.apply(sample),
            CategoryKind::Qualitative => f64::NAN,
        }
    }

    fn overlaps(&self, other: &Category) -> bool {
        self.range.start() <= other.range.end() && other.range.start() <= self.range.end()
    }
}

/// One band of a format, with its categories sorted by sample range.
#[derive(Debug, Clone)]
pub struct SampleDimension {
    /// 1-based band number.
    pub band: i32,
    pub name: String,
    pub units: Option<String>,
    pub categories: Vec<Category>,
}

impl SampleDimension {
    pub fn new(record: &BandRecord, mut categories: Vec<Category>) -> CatalogResult<Self> {
        categories.sort_by_key(|c| *c.range.start());
        for pair in categories.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(CatalogError::invalid_record(
                    "categories",
                    format!(
                        "categories '{}' and '{}' of band '{}' overlap",
                        pair[0].name, pair[1].name, record.name
                    ),
                ));
            }
        }
        Ok(Self {
            band: record.band,
            name: record.name.clone(),
            units: record.units.clone(),
            categories,
        })
    }

    /// Category containing a raw sample value.
    pub fn category(&self, sample: f64) -> Option<&Category> {
        if !sample.is_finite() {
            return None;
        }
        let sample = sample.round() as i32;
        self.categories.iter().find(|c| c.range.contains(&sample))
    }

    /// Geophysical value of a raw sample; NaN outside every quantitative category.
    pub fn geophysics(&self, sample: f64) -> f64 {
        match self.category(sample) {
            Some(category) => category.geophysics(sample),
            None => f64::NAN,
        }
    }

    pub fn summary(&self) -> SampleDimensionSummary {
        SampleDimensionSummary {
            band: self.band,
            name: self.name.clone(),
            units: self.units.clone(),
            categories: self
                .categories
                .iter()
                .map(|c| CategorySummary {
                    name: c.name.clone(),
                    lower: *c.range.start(),
                    upper: *c.range.end(),
                    quantitative: c.is_quantitative(),
                    colors: c.colors.len(),
                })
                .collect(),
        }
    }
}

/// Serializable view of a band, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SampleDimensionSummary {
    pub band: i32,
    pub name: String,
    pub units: Option<String>,
    pub categories: Vec<CategorySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub name: String,
    pub lower: i32,
    pub upper: i32,
    pub quantitative: bool,
    pub colors: usize,
}

/// Gradients never spread over more entries than a 16-bit sample can index.
pub const MAX_PALETTE_COLORS: usize = 1 << 16;

/// Parse a palette: `#RRGGBB` or `#RRGGBBAA` colours separated by `;`, or
/// a gradient `#RRGGBB..#RRGGBB` spread over `count` entries, at most
/// `MAX_PALETTE_COLORS`.
pub fn parse_palette(palette: &str, count: usize) -> CatalogResult<Vec<Rgba<u8>>> {
    let malformed = || CatalogError::invalid_record("categories", format!("malformed palette '{}'", palette));

    if let Some((from, to)) = palette.split_once("..") {
        let from = parse_color(from).ok_or_else(malformed)?;
        let to = parse_color(to).ok_or_else(malformed)?;
        return Ok(gradient(from, to, count.min(MAX_PALETTE_COLORS)));
    }

    palette
        .split(';')
        .map(|part| parse_color(part).ok_or_else(malformed))
        .collect()
}

fn parse_color(s: &str) -> Option<Rgba<u8>> {
    let hex = s.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        6 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255])),
        8 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
        _ => None,
    }
}

fn gradient(from: Rgba<u8>, to: Rgba<u8>, count: usize) -> Vec<Rgba<u8>> {
    if count <= 1 {
        return vec![from];
    }
    (0..count)
        .map(|i| {
            let t = i as f64 / (count - 1) as f64;
            let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
            Rgba([
                mix(from[0], to[0]),
                mix(from[1], to[1]),
                mix(from[2], to[2]),
                mix(from[3], to[3]),
            ])
        })
        .collect()
}
