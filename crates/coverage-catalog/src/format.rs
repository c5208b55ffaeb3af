//! Image formats, their bands, and the decode queue of each format.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use futures::future::try_join_all;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use catalog_store::{CatalogStore, FormatRecord};
use coverage_common::{CatalogError, CatalogResult};

use crate::category::{Category, Exp10Transform, SampleDimension, SampleTransform};
use crate::lock;
use crate::raster::AbortFlag;
use crate::reference::CoverageReference;

#[derive(Debug)]
struct InFlightRead {
    reference: CoverageReference,
    abort: AbortFlag,
    active: bool,
}

/// A format and the reads queued against it.
///
/// Decodes of one format are serialized by `decode_lock`. The in-flight map
/// has its own lock so `abort` never waits for a running decode. Reads are
/// keyed by the id of the requesting entry: entries reading the same file
/// under different parameters are distinct reads.
#[derive(Debug)]
pub struct FormatEntry {
    pub name: String,
    pub mime_type: String,
    pub extension: String,
    /// True when stored samples are already geophysical values.
    pub geophysics: bool,
    bands: Arc<[SampleDimension]>,
    pub(crate) decode_lock: AsyncMutex<()>,
    in_flight: Mutex<HashMap<u64, InFlightRead>>,
}

impl FormatEntry {
    pub fn new(record: FormatRecord, bands: Vec<SampleDimension>) -> Self {
        Self {
            name: record.name,
            mime_type: record.mime_type,
            extension: record.extension,
            geophysics: record.geophysics,
            bands: bands.into(),
            decode_lock: AsyncMutex::new(()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn bands(&self) -> &Arc<[SampleDimension]> {
        &self.bands
    }

    /// Register a read waiting for the decode lock.
    pub(crate) fn enqueue(&self, entry: u64, reference: &CoverageReference) -> AbortFlag {
        let abort = AbortFlag::new();
        lock(&self.in_flight).insert(
            entry,
            InFlightRead {
                reference: reference.clone(),
                abort: abort.clone(),
                active: false,
            },
        );
        abort
    }

    /// Mark a queued read as decoding. Returns false if it was aborted while waiting.
    pub(crate) fn begin(&self, entry: u64) -> bool {
        match lock(&self.in_flight).get_mut(&entry) {
            Some(read) => {
                read.active = true;
                true
            }
            None => false,
        }
    }

    pub(crate) fn finish(&self, entry: u64) {
        lock(&self.in_flight).remove(&entry);
    }

    /// Cancel the queued or running read of one entry.
    ///
    /// A queued read is dropped before it starts. A running decode is asked
    /// to stop; it may still complete. Returns false when nothing was queued.
    pub(crate) fn abort(&self, entry: u64) -> bool {
        let removed = lock(&self.in_flight).remove(&entry);
        match removed {
            Some(read) => {
                if read.active {
                    read.abort.abort();
                }
                warn!(format = %self.name, reference = %read.reference, active = read.active, "Aborted read");
                true
            }
            None => false,
        }
    }

    /// Number of reads queued or decoding.
    pub fn pending_reads(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

impl PartialEq for FormatEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for FormatEntry {}

/// Removes an in-flight registration when a read ends, however it ends.
pub(crate) struct InFlightGuard<'a> {
    pub format: &'a FormatEntry,
    pub entry: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.format.finish(self.entry);
    }
}

/// Loads formats and their bands, keeping one entry per format name.
pub struct FormatTable {
    store: Arc<dyn CatalogStore>,
    formats: Mutex<HashMap<String, Arc<FormatEntry>>>,
    exp10: OnceLock<Arc<dyn SampleTransform>>,
}

impl FormatTable {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            formats: Mutex::new(HashMap::new()),
            exp10: OnceLock::new(),
        }
    }

    /// Get a format with its bands.
    pub async fn get(&self, name: &str) -> CatalogResult<Arc<FormatEntry>> {
        if let Some(format) = lock(&self.formats).get(name) {
            return Ok(format.clone());
        }

        let record = self.store.format(name).await?;
        let bands = self.bands(name).await?;
        let format = Arc::new(FormatEntry::new(record, bands));

        let format = lock(&self.formats)
            .entry(name.to_string())
            .or_insert(format)
            .clone();
        debug!(format = %name, bands = format.bands.len(), "Loaded format");
        Ok(format)
    }

    /// Get the bands of a format, ordered by band number.
    ///
    /// Band numbers must run 1, 2, 3... without gaps.
    pub async fn bands(&self, format: &str) -> CatalogResult<Vec<SampleDimension>> {
        let mut records = self.store.bands(format).await?;
        records.sort_by_key(|r| r.band);

        for (i, record) in records.iter().enumerate() {
            let expected = i as i32 + 1;
            if record.band != expected {
                return Err(CatalogError::invalid_record(
                    "bands",
                    format!(
                        "non-consecutive bands in format '{}': expected band {} but found {}",
                        format, expected, record.band
                    ),
                ));
            }
        }

        let categories = try_join_all(records.iter().map(|r| self.store.categories(r.id))).await?;
        records
            .iter()
            .zip(categories)
            .map(|(record, rows)| {
                let categories = rows
                    .iter()
                    .map(|row| Category::from_record(row, || self.exp10()))
                    .collect::<CatalogResult<Vec<_>>>()?;
                SampleDimension::new(record, categories)
            })
            .collect()
    }

    /// The `10^x` transform shared by every logarithmic category.
    fn exp10(&self) -> Arc<dyn SampleTransform> {
        self.exp10.get_or_init(|| Arc::new(Exp10Transform)).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_store::{BandRecord, CategoryRecord, MemoryCatalogStore};

    fn format_record() -> FormatRecord {
        FormatRecord {
            name: "PNG".to_string(),
            mime_type: "image/png".to_string(),
            extension: "png".to_string(),
            geophysics: false,
        }
    }

    fn band(id: i64, band: i32) -> BandRecord {
        BandRecord {
            id,
            format: "PNG".to_string(),
            band,
            name: format!("band{}", band),
            units: None,
        }
    }

    fn log_category(band_id: i64) -> CategoryRecord {
        CategoryRecord {
            band_id,
            name: "chl".to_string(),
            lower: 1,
            upper: 255,
            c0: Some(-2.0),
            c1: Some(0.01),
            log: true,
            colors: None,
        }
    }

    #[tokio::test]
    async fn test_gap_in_bands_is_invalid() {
        let store = MemoryCatalogStore::new()
            .with_format(format_record())
            .with_band(band(1, 1))
            .with_band(band(2, 2))
            .with_band(band(4, 4));
        let table = FormatTable::new(Arc::new(store));

        let err = table.bands("PNG").await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRecord { .. }));
        assert!(err.to_string().contains("non-consecutive bands"));
    }

    #[tokio::test]
    async fn test_bands_are_sorted() {
        let store = MemoryCatalogStore::new()
            .with_format(format_record())
            .with_band(band(12, 2))
            .with_band(band(11, 1));
        let table = FormatTable::new(Arc::new(store));

        let bands = table.bands("PNG").await.unwrap();
        assert_eq!(bands.iter().map(|b| b.band).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_exp10_is_shared() {
        let store = MemoryCatalogStore::new()
            .with_format(format_record())
            .with_band(band(1, 1))
            .with_category(log_category(1));
        let table = FormatTable::new(Arc::new(store));

        table.bands("PNG").await.unwrap();
        let first = table.exp10();
        assert!(Arc::ptr_eq(&first, &table.exp10()));
    }

    #[tokio::test]
    async fn test_one_entry_per_format() {
        let store = MemoryCatalogStore::new().with_format(format_record()).with_band(band(1, 1));
        let table = FormatTable::new(Arc::new(store));

        let a = table.get("PNG").await.unwrap();
        let b = table.get("PNG").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(matches!(table.get("GIF").await, Err(CatalogError::NotFound { .. })));
    }
}
