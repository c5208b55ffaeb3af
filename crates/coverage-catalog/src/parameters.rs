//! Parameters shared by the entries a catalog builds under one configuration.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use object_store::path::Path;

use coverage_common::{BoundingBox, CoordinateTransform, Crs, TemporalCrs};

use crate::format::FormatEntry;
use crate::operation::Operation;

/// Immutable bundle describing how entries of one series, format and CRS are read.
///
/// Equal bundles are pooled, so entries built by different catalogs with
/// the same configuration share one instance.
#[derive(Debug, Clone)]
pub struct Parameters {
    pub series: String,
    /// Directory of the series, relative to the source root.
    pub series_path: String,
    pub format: Arc<FormatEntry>,
    pub operation: Option<Operation>,
    pub table_crs: Crs,
    pub coverage_crs: Crs,
    pub temporal_crs: TemporalCrs,
    /// Area of interest, in the table CRS.
    pub geographic_area: BoundingBox,
    /// Desired cell size, in table units per pixel.
    pub resolution: Option<(f64, f64)>,
    pub root_directory: Option<String>,
    pub root_url: Option<String>,
    pub min_tile_size: u32,
    pub resolution_epsilon: f64,
    /// Table CRS to coverage CRS.
    pub transform: Arc<dyn CoordinateTransform>,
}

impl Parameters {
    /// Location of an image file relative to the source root.
    pub fn object_path(&self, filename: &str) -> Path {
        let file = if self.format.extension.is_empty() {
            filename.to_string()
        } else {
            format!("{}.{}", filename, self.format.extension)
        };
        let path = self.series_path.trim_matches('/');
        if path.is_empty() {
            Path::from(file)
        } else {
            Path::from(format!("{}/{}", path, file))
        }
    }

    /// The configured operation, or plain interpolation.
    pub fn effective_operation(&self) -> Operation {
        self.operation.unwrap_or_default()
    }

    #[allow(clippy::type_complexity)]
    fn identity(
        &self,
    ) -> (
        &str,
        &str,
        &str,
        &Option<Operation>,
        &Crs,
        &Crs,
        [u64; 4],
        Option<(u64, u64)>,
        &Option<String>,
        &Option<String>,
        u32,
        u64,
    ) {
        (
            &self.series,
            &self.series_path,
            &self.format.name,
            &self.operation,
            &self.table_crs,
            &self.coverage_crs,
            self.geographic_area.to_bits(),
            self.resolution.map(|(x, y)| (x.to_bits(), y.to_bits())),
            &self.root_directory,
            &self.root_url,
            self.min_tile_size,
            self.resolution_epsilon.to_bits(),
        )
    }
}

impl PartialEq for Parameters {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity() && self.temporal_crs == other.temporal_crs
    }
}

impl Eq for Parameters {}

impl Hash for Parameters {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}
