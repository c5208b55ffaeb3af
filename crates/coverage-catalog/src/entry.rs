//! Coverage entries: one reference read under one set of parameters.
//!
//! An entry decodes its image lazily and keeps two cache tiers:
//!
//! ```text
//! coverage()
//!     │
//!     ├─► tier 2: geophysical coverage, strong until demoted, then weak
//!     │         └─► hit: return it
//!     │
//!     ├─► region computation ──► no overlap: return None
//!     │
//!     ├─► tier 1: raw pixels, weak, alive while a caller of image() holds them
//!     │         └─► miss: decode under the format lock
//!     │
//!     └─► geophysics + operation ──► store both tiers, record bytes
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, info_span, warn};

use coverage_common::{BoundingBox, CatalogError, CatalogResult, Envelope, TimeRange};

use crate::coverage::GridCoverage;
use crate::format::{FormatEntry, InFlightGuard};
use crate::lock;
use crate::parameters::Parameters;
use crate::raster::{PixelRect, RasterImage, ReadParams};
use crate::reference::CoverageReference;
use crate::region::{compute_region, ReadRegion, RegionRequest};
use crate::services::CoverageReader;

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// How the tier-2 coverage is held.
enum Retained {
    Empty,
    Strong(Arc<GridCoverage>),
    /// Demoted: alive only while a caller holds it.
    Weak(Weak<GridCoverage>),
}

struct EntryCache {
    image: Weak<RasterImage>,
    coverage: Retained,
}

pub struct CoverageEntry {
    id: u64,
    reference: CoverageReference,
    parameters: Arc<Parameters>,
    reader: Arc<CoverageReader>,
    cache: Mutex<EntryCache>,
    load_lock: AsyncMutex<()>,
}

impl CoverageEntry {
    pub fn new(reference: CoverageReference, parameters: Arc<Parameters>, reader: Arc<CoverageReader>) -> Self {
        Self {
            id: NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed),
            reference,
            parameters,
            reader,
            cache: Mutex::new(EntryCache {
                image: Weak::new(),
                coverage: Retained::Empty,
            }),
            load_lock: AsyncMutex::new(()),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub fn reference(&self) -> &CoverageReference {
        &self.reference
    }

    pub fn parameters(&self) -> &Arc<Parameters> {
        &self.parameters
    }

    pub fn name(&self) -> &str {
        self.reference.name()
    }

    pub fn time_range(&self) -> TimeRange {
        self.reference.time_range
    }

    pub fn geographic_bounding_box(&self) -> BoundingBox {
        self.reference.bbox
    }

    pub fn envelope(&self) -> Envelope {
        self.reference.envelope()
    }

    pub fn grid_size(&self) -> (u32, u32) {
        (self.reference.width, self.reference.height)
    }

    /// Native cell size in table units per pixel.
    pub fn resolution(&self) -> (f64, f64) {
        self.reference.resolution()
    }

    pub fn format(&self) -> &Arc<FormatEntry> {
        &self.parameters.format
    }

    /// True when the native cells are no larger than `preferred`, within
    /// the configured relative tolerance.
    pub fn has_enough_resolution(&self, preferred: Option<(f64, f64)>) -> bool {
        let Some((px, py)) = preferred else {
            return true;
        };
        let (rx, ry) = self.resolution();
        let tolerance = 1.0 + self.parameters.resolution_epsilon;
        rx <= px * tolerance && ry <= py * tolerance
    }

    /// Extent of the whole image in the coverage CRS.
    pub fn image_extent(&self) -> CatalogResult<BoundingBox> {
        self.to_coverage_crs(&self.reference.bbox)
    }

    /// Clip rectangle and sub-sampling for the catalog's area and
    /// resolution, or `None` when the area misses the image.
    pub fn compute_bounds(&self) -> CatalogResult<Option<ReadRegion>> {
        let request = RegionRequest {
            image_extent: self.image_extent()?,
            image_size: self.grid_size(),
            area: self.to_coverage_crs(&self.parameters.geographic_area)?,
            native_resolution: self.resolution(),
            desired_resolution: self.parameters.resolution,
            min_tile_size: self.parameters.min_tile_size,
            epsilon: self.parameters.resolution_epsilon,
        };
        Ok(compute_region(&request))
    }

    fn to_coverage_crs(&self, bbox: &BoundingBox) -> CatalogResult<BoundingBox> {
        self.parameters.transform.transform_bbox(bbox).map_err(|e| {
            error!(
                entry = %self.reference,
                from = %self.parameters.table_crs.name,
                to = %self.parameters.coverage_crs.name,
                error = %e,
                "Stored geometry can not be transformed"
            );
            CatalogError::illegal_state(format!("can not transform the extent of '{}': {}", self.reference, e))
        })
    }

    /// Get the decoded coverage, reading the image if no cached copy is alive.
    ///
    /// Returns `None` when the catalog's area misses the image or the read
    /// was aborted.
    pub async fn coverage(self: &Arc<Self>) -> CatalogResult<Option<Arc<GridCoverage>>> {
        if let Some(coverage) = self.retained() {
            self.reader.memory.record_hit();
            debug!(entry = %self.reference, "Coverage cache hit");
            return Ok(Some(coverage));
        }

        let _load = self.load_lock.lock().await;
        if let Some(coverage) = self.retained() {
            self.reader.memory.record_hit();
            return Ok(Some(coverage));
        }
        self.reader.memory.record_miss();
        debug!(entry = %self.reference, "Coverage cache miss");

        let Some(region) = self.compute_bounds()? else {
            debug!(entry = %self.reference, "Area of interest misses the image");
            return Ok(None);
        };

        let Some(image) = self.load_image(&region).await? else {
            return Ok(None);
        };

        let coverage = Arc::new(self.build(&image, &region)?);
        lock(&self.cache).coverage = Retained::Strong(coverage.clone());
        self.reader.memory.record(self, coverage.byte_size());
        Ok(Some(coverage))
    }

    /// Get the raw decoded pixels of the catalog's area.
    ///
    /// The entry keeps them only weakly: they stay shared with later
    /// `coverage()` calls for as long as the caller holds them.
    pub async fn image(&self) -> CatalogResult<Option<Arc<RasterImage>>> {
        let cached = lock(&self.cache).image.upgrade();
        if cached.is_some() {
            return Ok(cached);
        }

        let _load = self.load_lock.lock().await;
        let Some(region) = self.compute_bounds()? else {
            return Ok(None);
        };
        self.load_image(&region).await
    }

    /// Tier-1 pixels if alive, otherwise a fresh decode.
    async fn load_image(&self, region: &ReadRegion) -> CatalogResult<Option<Arc<RasterImage>>> {
        let cached = lock(&self.cache).image.upgrade();
        if let Some(image) = cached {
            debug!(entry = %self.reference, "Reusing decoded pixels");
            return Ok(Some(image));
        }

        let Some(image) = self.read(region).await? else {
            return Ok(None);
        };
        lock(&self.cache).image = Arc::downgrade(&image);
        Ok(Some(image))
    }

    /// The tier-2 coverage if still alive. A demoted coverage found alive is
    /// retained strongly again.
    fn retained(self: &Arc<Self>) -> Option<Arc<GridCoverage>> {
        let mut cache = lock(&self.cache);
        if let Retained::Strong(coverage) = &cache.coverage {
            let coverage = coverage.clone();
            drop(cache);
            self.reader.memory.touch(self.id);
            return Some(coverage);
        }

        let revived = match &cache.coverage {
            Retained::Weak(weak) => weak.upgrade(),
            _ => None,
        };
        cache.coverage = match &revived {
            Some(coverage) => Retained::Strong(coverage.clone()),
            None => Retained::Empty,
        };
        drop(cache);

        if let Some(coverage) = &revived {
            debug!(entry = %self.reference, "Revived demoted coverage");
            self.reader.memory.record(self, coverage.byte_size());
        }
        revived
    }

    async fn read(&self, region: &ReadRegion) -> CatalogResult<Option<Arc<RasterImage>>> {
        let format = &self.parameters.format;
        let abort = format.enqueue(self.id, &self.reference);
        let _in_flight = InFlightGuard { format, entry: self.id };

        let _decode = format.decode_lock.lock().await;
        if !format.begin(self.id) {
            self.reader.memory.record_abort();
            warn!(entry = %self.reference, "Read aborted before decoding");
            return Ok(None);
        }

        let path = self.parameters.object_path(&self.reference.filename);
        let bytes = self.reader.sources.fetch(&path).await?;
        if abort.is_aborted() {
            self.reader.memory.record_abort();
            warn!(entry = %self.reference, "Read aborted after fetching");
            return Ok(None);
        }

        let params = ReadParams {
            image_index: self.reference.image_index,
            source_region: region.clip,
            subsampling: region.subsampling,
            expected_size: self.grid_size(),
        };
        let decoder = self.reader.decoder.clone();
        let flag = abort.clone();
        let span = info_span!("decode", entry = %self.reference, format = %format.name);
        let result = tokio::task::spawn_blocking(move || {
            let _enter = span.enter();
            decoder.decode(&bytes, &params, &flag)
        })
        .await
        .map_err(|e| CatalogError::io(format!("decode task of '{}' failed: {}", self.reference, e)))?;

        match result {
            Ok(image) if !abort.is_aborted() => {
                self.reader.memory.record_decode();
                info!(
                    entry = %self.reference,
                    clip = ?region.clip,
                    subsampling = ?region.subsampling,
                    bytes = image.byte_size(),
                    "Decoded image"
                );
                Ok(Some(Arc::new(image)))
            }
            Ok(_) => {
                self.reader.memory.record_abort();
                warn!(entry = %self.reference, "Decode completed after abort, result dropped");
                Ok(None)
            }
            Err(e) if abort.is_aborted() => {
                self.reader.memory.record_abort();
                warn!(entry = %self.reference, error = %e, "Aborted decode failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn build(&self, image: &RasterImage, region: &ReadRegion) -> CatalogResult<GridCoverage> {
        let format = &self.parameters.format;
        let bbox = clip_extent(&self.image_extent()?, self.grid_size(), &region.clip);
        let coverage = GridCoverage::from_raster(
            self.name(),
            image,
            format.bands().clone(),
            format.geophysics,
            bbox,
            self.parameters.coverage_crs.clone(),
            self.reference.time_range,
        )?;
        Ok(self.parameters.effective_operation().apply(coverage))
    }

    /// Demote a strongly retained coverage. Returns false if there was none.
    pub(crate) fn demote(&self) -> bool {
        let mut cache = lock(&self.cache);
        if let Retained::Strong(coverage) = &cache.coverage {
            let weak = Arc::downgrade(coverage);
            cache.coverage = Retained::Weak(weak);
            return true;
        }
        false
    }

    /// Cancel a queued or running read of this entry.
    pub fn abort(&self) -> bool {
        self.parameters.format.abort(self.id)
    }

    /// True when a decoded coverage is alive.
    pub fn is_cached(&self) -> bool {
        match &lock(&self.cache).coverage {
            Retained::Strong(_) => true,
            Retained::Weak(weak) => weak.strong_count() > 0,
            Retained::Empty => false,
        }
    }

    /// True when the coverage has been demoted to weak retention.
    pub fn is_demoted(&self) -> bool {
        matches!(lock(&self.cache).coverage, Retained::Weak(_))
    }
}

/// Extent covered by a pixel rectangle of an image.
fn clip_extent(extent: &BoundingBox, size: (u32, u32), clip: &PixelRect) -> BoundingBox {
    let cell_x = extent.width() / size.0 as f64;
    let cell_y = extent.height() / size.1 as f64;
    let min_x = extent.min_x + clip.x as f64 * cell_x;
    let max_y = extent.max_y - clip.y as f64 * cell_y;
    BoundingBox::new(
        min_x,
        max_y - clip.height as f64 * cell_y,
        min_x + clip.width as f64 * cell_x,
        max_y,
    )
}

impl Drop for CoverageEntry {
    fn drop(&mut self) {
        self.reader.memory.forget(self.id);
    }
}

impl PartialEq for CoverageEntry {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference && *self.parameters == *other.parameters
    }
}

impl Eq for CoverageEntry {}

impl Hash for CoverageEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reference.hash(state);
        self.parameters.hash(state);
    }
}

impl fmt::Debug for CoverageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoverageEntry")
            .field("reference", &self.reference)
            .field("cached", &self.is_cached())
            .finish()
    }
}

impl fmt::Display for CoverageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_extent() {
        let extent = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let bbox = clip_extent(&extent, (100, 100), &PixelRect::new(10, 20, 30, 40));
        assert_eq!(bbox, BoundingBox::new(1.0, 4.0, 4.0, 8.0));
    }
}
