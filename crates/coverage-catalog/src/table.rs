//! The coverage table: a configurable view over the catalog's coverages.
//!
//! A table holds a series, a time range, a geographic box, an optional
//! preferred resolution and an optional operation. Queries return pooled
//! entries, so two tables with the same configuration share entries and
//! their caches.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use catalog_store::{CoverageQuery, CoverageRecord};
use coverage_common::{BoundingBox, CatalogError, CatalogResult, Crs, Envelope, TimeRange};

use crate::comparator::CoverageComparator;
use crate::entry::CoverageEntry;
use crate::operation::Operation;
use crate::parameters::Parameters;
use crate::reference::CoverageReference;
use crate::services::CatalogServices;

#[derive(Debug, Clone)]
struct TableConfig {
    series: Option<String>,
    operation: Option<Operation>,
    resolution: Option<(f64, f64)>,
    time_range: TimeRange,
    bbox: BoundingBox,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            series: None,
            operation: None,
            resolution: None,
            time_range: TimeRange::unbounded(),
            bbox: BoundingBox::world(),
        }
    }
}

/// (series, format, CRS name)
type ParametersKey = (String, String, String);

/// State computed from the configuration on demand.
#[derive(Default)]
struct Derived {
    envelope: Option<Envelope>,
    comparator: Option<CoverageComparator>,
    parameters: HashMap<ParametersKey, Arc<Parameters>>,
}

struct TableState {
    config: TableConfig,
    derived: Derived,
}

impl TableState {
    fn requested_envelope(&mut self) -> Envelope {
        let config = &self.config;
        *self
            .derived
            .envelope
            .get_or_insert_with(|| Envelope::new(config.bbox, config.time_range))
    }

    fn comparator(&mut self) -> CoverageComparator {
        if let Some(comparator) = self.derived.comparator {
            return comparator;
        }
        let comparator = CoverageComparator::new(self.requested_envelope());
        self.derived.comparator = Some(comparator);
        comparator
    }

    fn clear(&mut self, reason: &str) {
        self.derived = Derived::default();
        debug!(reason, "Cleared derived table state");
    }
}

pub struct CoverageTable {
    services: Arc<CatalogServices>,
    state: AsyncMutex<TableState>,
}

impl CoverageTable {
    /// A table over every series, the whole world and all times.
    pub fn new(services: Arc<CatalogServices>) -> Self {
        Self::from_config(services, TableConfig::default())
    }

    pub fn for_series(services: Arc<CatalogServices>, series: impl Into<String>) -> Self {
        let config = TableConfig {
            series: Some(series.into()),
            ..TableConfig::default()
        };
        Self::from_config(services, config)
    }

    fn from_config(services: Arc<CatalogServices>, config: TableConfig) -> Self {
        Self {
            services,
            state: AsyncMutex::new(TableState {
                config,
                derived: Derived::default(),
            }),
        }
    }

    pub fn services(&self) -> &Arc<CatalogServices> {
        &self.services
    }

    /// A copy of this table's configuration with its own derived state.
    pub async fn view(&self) -> CoverageTable {
        let config = self.state.lock().await.config.clone();
        Self::from_config(self.services.clone(), config)
    }

    pub async fn series(&self) -> Option<String> {
        self.state.lock().await.config.series.clone()
    }

    pub async fn time_range(&self) -> TimeRange {
        self.state.lock().await.config.time_range
    }

    pub async fn geographic_bounding_box(&self) -> BoundingBox {
        self.state.lock().await.config.bbox
    }

    pub async fn preferred_resolution(&self) -> Option<(f64, f64)> {
        self.state.lock().await.config.resolution
    }

    pub async fn operation(&self) -> Option<Operation> {
        self.state.lock().await.config.operation
    }

    /// Restrict the table to one series, or `None` for every series.
    pub async fn set_series(&self, series: Option<String>) {
        let mut state = self.state.lock().await;
        if state.config.series != series {
            state.config.series = series;
            state.clear("series");
        }
    }

    pub async fn set_time_range(&self, time_range: TimeRange) {
        let mut state = self.state.lock().await;
        if state.config.time_range != time_range {
            state.config.time_range = time_range;
            state.derived.envelope = None;
            state.derived.comparator = None;
            debug!(start = %time_range.start, end = %time_range.end, "Time range changed");
        }
    }

    pub async fn set_geographic_bounding_box(&self, bbox: BoundingBox) {
        let mut state = self.state.lock().await;
        if state.config.bbox != bbox {
            state.config.bbox = bbox;
            state.clear("bounding box");
        }
    }

    /// Set the desired cell size in degrees per pixel.
    pub async fn set_preferred_resolution(&self, resolution: Option<(f64, f64)>) {
        let bits = |r: Option<(f64, f64)>| r.map(|(x, y)| (x.to_bits(), y.to_bits()));
        let mut state = self.state.lock().await;
        if bits(state.config.resolution) != bits(resolution) {
            state.config.resolution = resolution;
            state.clear("resolution");
        }
    }

    pub async fn set_operation(&self, operation: Option<Operation>) {
        let mut state = self.state.lock().await;
        if state.config.operation != operation {
            state.config.operation = operation;
            state.clear("operation");
        }
    }

    /// Entries intersecting the table's time range and box, one per
    /// spatio-temporal identity.
    pub async fn entries(&self) -> CatalogResult<Vec<Arc<CoverageEntry>>> {
        let mut state = self.state.lock().await;
        self.load_entries(&mut state).await
    }

    /// The entry closest to the requested envelope.
    pub async fn entry(&self) -> CatalogResult<Option<Arc<CoverageEntry>>> {
        let mut state = self.state.lock().await;
        let entries = self.load_entries(&mut state).await?;
        let comparator = state.comparator();
        Ok(comparator.best(&entries).cloned())
    }

    /// The entry with the given name, in the table's series if one is set.
    ///
    /// Only a `None` name yields `Ok(None)`.
    pub async fn entry_named(&self, name: Option<&str>) -> CatalogResult<Option<Arc<CoverageEntry>>> {
        let Some(name) = name else {
            return Ok(None);
        };
        let mut state = self.state.lock().await;
        let mut records = self
            .services
            .store
            .find_coverages_named(state.config.series.as_deref(), name)
            .await?;
        if records.len() > 1 {
            return Err(CatalogError::invalid_record(
                "coverages",
                format!("{} coverages are named '{}'", records.len(), name),
            ));
        }
        let record = records.pop().ok_or_else(|| CatalogError::not_found("coverage", name))?;
        self.entry_from_record(&mut state, record).await.map(Some)
    }

    /// Union of the envelopes of the current entries.
    pub async fn envelope(&self) -> CatalogResult<Option<Envelope>> {
        let entries = self.entries().await?;
        Ok(entries
            .iter()
            .map(|entry| entry.envelope())
            .reduce(|a, b| a.union(&b)))
    }

    /// Time ranges of the current entries, ordered and without duplicates.
    pub async fn available_times(&self) -> CatalogResult<Vec<TimeRange>> {
        let entries = self.entries().await?;
        let mut times: Vec<TimeRange> = entries.iter().map(|entry| entry.time_range()).collect();
        times.sort_by_key(|t| (t.start, t.end));
        times.dedup();
        Ok(times)
    }

    async fn load_entries(&self, state: &mut TableState) -> CatalogResult<Vec<Arc<CoverageEntry>>> {
        let query = CoverageQuery {
            series: state.config.series.clone(),
            time_range: state.config.time_range,
            bbox: state.config.bbox,
        };
        let records = self.services.store.find_coverages(&query).await?;
        let found = records.len();

        let mut entries = Vec::with_capacity(found);
        for record in records {
            entries.push(self.entry_from_record(state, record).await?);
        }
        let entries = filter_resolution(entries, state.config.resolution);
        debug!(
            series = ?state.config.series,
            found,
            kept = entries.len(),
            "Loaded coverage entries"
        );
        Ok(entries)
    }

    async fn entry_from_record(&self, state: &mut TableState, record: CoverageRecord) -> CatalogResult<Arc<CoverageEntry>> {
        let reference = CoverageReference::try_from(record)?;
        let parameters = self.parameters(state, &reference).await?;
        let entry = CoverageEntry::new(reference, parameters, self.services.reader.clone());
        Ok(self.services.entries.canonicalize(entry))
    }

    async fn parameters(&self, state: &mut TableState, reference: &CoverageReference) -> CatalogResult<Arc<Parameters>> {
        let key = (reference.series.clone(), reference.format.clone(), reference.crs.clone());
        if let Some(parameters) = state.derived.parameters.get(&key) {
            return Ok(parameters.clone());
        }

        let series = self.services.store.series(&reference.series).await?;
        let format = self.services.formats.get(&reference.format).await?;
        let table_crs = Crs::wgs84();
        let coverage_crs = self.coverage_crs(&reference.crs).await?;
        let transform = self.services.geodesy.transform(&table_crs, &coverage_crs)?;
        let config = &self.services.config;

        let parameters = self.services.parameters.canonicalize(Parameters {
            series: series.name,
            series_path: series.path,
            format,
            operation: state.config.operation,
            table_crs,
            coverage_crs,
            temporal_crs: config.temporal_crs(),
            geographic_area: state.config.bbox,
            resolution: state.config.resolution,
            root_directory: config.root_directory.clone(),
            root_url: config.root_url.clone(),
            min_tile_size: config.min_tile_size,
            resolution_epsilon: config.resolution_epsilon,
            transform,
        });
        debug!(series = %key.0, format = %key.1, crs = %key.2, "Built entry parameters");
        state.derived.parameters.insert(key, parameters.clone());
        Ok(parameters)
    }

    async fn coverage_crs(&self, name: &str) -> CatalogResult<Crs> {
        let mut definitions = self.services.store.crs_definitions(name).await?;
        if definitions.len() > 1 {
            warn!(crs = %name, count = definitions.len(), "Ambiguous CRS records");
            return Err(CatalogError::invalid_record(
                "crs",
                format!("duplicate CRS definitions for '{}'", name),
            ));
        }
        let definition = definitions.pop().ok_or_else(|| CatalogError::not_found("crs", name))?;
        self.services.geodesy.parse_crs(&definition.name, &definition.definition)
    }
}

impl std::fmt::Debug for CoverageTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverageTable").finish_non_exhaustive()
    }
}

type GroupKey = (String, TimeRange, [u64; 4]);

/// Keep one entry per (series, time range, box): the coarsest one with
/// enough resolution, or the finest when none has enough.
fn filter_resolution(entries: Vec<Arc<CoverageEntry>>, preferred: Option<(f64, f64)>) -> Vec<Arc<CoverageEntry>> {
    let mut order: Vec<GroupKey> = Vec::new();
    let mut kept: HashMap<GroupKey, Arc<CoverageEntry>> = HashMap::new();

    for entry in entries {
        let reference = entry.reference();
        let key = (reference.series.clone(), reference.time_range, reference.bbox.to_bits());
        match kept.get_mut(&key) {
            Some(current) => {
                if replaces(&entry, current, preferred) {
                    debug!(kept = %entry, dropped = %current, "Collapsed entries differing in resolution");
                    *current = entry;
                }
            }
            None => {
                order.push(key.clone());
                kept.insert(key, entry);
            }
        }
    }

    order.into_iter().filter_map(|key| kept.remove(&key)).collect()
}

fn replaces(candidate: &CoverageEntry, current: &CoverageEntry, preferred: Option<(f64, f64)>) -> bool {
    let cell = |entry: &CoverageEntry| {
        let (x, y) = entry.resolution();
        x * y
    };
    match (
        candidate.has_enough_resolution(preferred),
        current.has_enough_resolution(preferred),
    ) {
        (true, false) => true,
        (false, true) => false,
        (true, true) if preferred.is_some() => cell(candidate) > cell(current),
        _ => cell(candidate) < cell(current),
    }
}
