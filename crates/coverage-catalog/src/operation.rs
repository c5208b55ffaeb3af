//! Post-processing operations applied to decoded coverages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use coverage_common::CatalogError;

use crate::coverage::GridCoverage;

/// Interpolation used when a coverage is resampled downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// Nearest neighbor (preserves exact values).
    Nearest,
    /// Bilinear interpolation (smooth, slight value changes).
    #[default]
    Bilinear,
    /// Bicubic interpolation (smoothest, more compute).
    Bicubic,
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
            Self::Bicubic => write!(f, "bicubic"),
        }
    }
}

/// Operation applied after geophysical conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum Operation {
    /// Values are left untouched; only the interpolation tag is set.
    Interpolate {
        #[serde(default)]
        method: InterpolationMethod,
    },
    /// Fill NaN cells with the mean of their valid neighbours, repeated `passes` times.
    NodataFilter { passes: u32 },
    /// Norm of the central-difference gradient, per pixel.
    GradientMagnitude,
}

impl Default for Operation {
    fn default() -> Self {
        Operation::Interpolate {
            method: InterpolationMethod::default(),
        }
    }
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Interpolate { .. } => "interpolate",
            Operation::NodataFilter { .. } => "nodata-filter",
            Operation::GradientMagnitude => "gradient-magnitude",
        }
    }

    pub fn apply(&self, mut coverage: GridCoverage) -> GridCoverage {
        let (width, height, bands) = (
            coverage.width as usize,
            coverage.height as usize,
            coverage.band_count(),
        );
        match self {
            Operation::Interpolate { .. } => {}
            Operation::NodataFilter { passes } => {
                for _ in 0..*passes {
                    coverage.values = fill_nodata(&coverage.values, width, height, bands);
                }
            }
            Operation::GradientMagnitude => {
                coverage.values = gradient_magnitude(&coverage.values, width, height, bands);
            }
        }
        coverage
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Interpolate { method } => write!(f, "interpolate({})", method),
            Operation::NodataFilter { passes } => write!(f, "nodata-filter({})", passes),
            Operation::GradientMagnitude => write!(f, "gradient-magnitude"),
        }
    }
}

impl FromStr for Operation {
    type Err = CatalogError;

    /// Parse "interpolate", "interpolate:nearest", "nodata-filter",
    /// "nodata-filter:3" or "gradient-magnitude".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match s.trim().split_once(':') {
            Some((name, arg)) => (name, Some(arg.trim())),
            None => (s.trim(), None),
        };
        let invalid = || CatalogError::InvalidArgument(format!("unknown operation '{}'", s));
        match (name.to_lowercase().as_str(), arg) {
            ("interpolate", None) => Ok(Operation::default()),
            ("interpolate", Some(method)) => {
                let method = match method.to_lowercase().as_str() {
                    "nearest" => InterpolationMethod::Nearest,
                    "bilinear" => InterpolationMethod::Bilinear,
                    "bicubic" | "cubic" => InterpolationMethod::Bicubic,
                    _ => return Err(invalid()),
                };
                Ok(Operation::Interpolate { method })
            }
            ("nodata-filter", None) => Ok(Operation::NodataFilter { passes: 1 }),
            ("nodata-filter", Some(passes)) => passes
                .parse()
                .map(|passes| Operation::NodataFilter { passes })
                .map_err(|_| invalid()),
            ("gradient-magnitude", None) => Ok(Operation::GradientMagnitude),
            _ => Err(invalid()),
        }
    }
}

fn fill_nodata(values: &[f32], width: usize, height: usize, bands: usize) -> Vec<f32> {
    let mut out = values.to_vec();
    for y in 0..height {
        for x in 0..width {
            for b in 0..bands {
                let i = (y * width + x) * bands + b;
                if !values[i].is_nan() {
                    continue;
                }
                let mut sum = 0.0f64;
                let mut count = 0;
                for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                        let v = values[(ny * width + nx) * bands + b];
                        if !v.is_nan() {
                            sum += v as f64;
                            count += 1;
                        }
                    }
                }
                if count > 0 {
                    out[i] = (sum / count as f64) as f32;
                }
            }
        }
    }
    out
}

fn gradient_magnitude(values: &[f32], width: usize, height: usize, bands: usize) -> Vec<f32> {
    let at = |x: usize, y: usize, b: usize| values[(y * width + x) * bands + b];
    // Central difference inside, one-sided at the edges.
    let diff = |lo: f32, hi: f32, span: usize| if span == 0 { 0.0 } else { (hi - lo) / span as f32 };

    let mut out = Vec::with_capacity(values.len());
    for y in 0..height {
        for x in 0..width {
            for b in 0..bands {
                let (x0, x1) = (x.saturating_sub(1), (x + 1).min(width - 1));
                let (y0, y1) = (y.saturating_sub(1), (y + 1).min(height - 1));
                let gx = diff(at(x0, y, b), at(x1, y, b), x1 - x0);
                let gy = diff(at(x, y0, b), at(x, y1, b), y1 - y0);
                out.push((gx * gx + gy * gy).sqrt());
            }
        }
    }
    out
}
