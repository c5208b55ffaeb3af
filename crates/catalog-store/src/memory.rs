//! In-memory catalog store.
//!
//! Holds the catalog tables in vectors behind a `RwLock`. Used by tests and
//! by tools that build a catalog from a listing rather than a database.

use async_trait::async_trait;
use tokio::sync::RwLock;

use coverage_common::{CatalogError, CatalogResult};

use crate::records::{
    BandRecord, CategoryRecord, CoverageQuery, CoverageRecord, CrsRecord, DescriptorRecord,
    FormatRecord, LinearModelRecord, SeriesRecord,
};
use crate::store::CatalogStore;

#[derive(Debug, Default)]
struct Tables {
    series: Vec<SeriesRecord>,
    formats: Vec<FormatRecord>,
    bands: Vec<BandRecord>,
    categories: Vec<CategoryRecord>,
    crs: Vec<CrsRecord>,
    coverages: Vec<CoverageRecord>,
    descriptors: Vec<DescriptorRecord>,
    linear_models: Vec<LinearModelRecord>,
}

/// Catalog tables kept in memory.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    tables: RwLock<Tables>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, record: SeriesRecord) -> Self {
        self.tables.get_mut().series.push(record);
        self
    }

    pub fn with_format(mut self, record: FormatRecord) -> Self {
        self.tables.get_mut().formats.push(record);
        self
    }

    pub fn with_band(mut self, record: BandRecord) -> Self {
        self.tables.get_mut().bands.push(record);
        self
    }

    pub fn with_category(mut self, record: CategoryRecord) -> Self {
        self.tables.get_mut().categories.push(record);
        self
    }

    pub fn with_crs(mut self, record: CrsRecord) -> Self {
        self.tables.get_mut().crs.push(record);
        self
    }

    pub fn with_coverage(mut self, record: CoverageRecord) -> Self {
        self.tables.get_mut().coverages.push(record);
        self
    }

    pub fn with_descriptor(mut self, record: DescriptorRecord) -> Self {
        self.tables.get_mut().descriptors.push(record);
        self
    }

    pub fn with_linear_term(mut self, record: LinearModelRecord) -> Self {
        self.tables.get_mut().linear_models.push(record);
        self
    }

    /// Add a coverage to a store already shared between tasks.
    pub async fn add_coverage(&self, record: CoverageRecord) {
        self.tables.write().await.coverages.push(record);
    }

    /// Number of coverage rows.
    pub async fn coverage_count(&self) -> usize {
        self.tables.read().await.coverages.len()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn series(&self, name: &str) -> CatalogResult<SeriesRecord> {
        let tables = self.tables.read().await;
        tables
            .series
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| CatalogError::not_found("series", name))
    }

    async fn format(&self, name: &str) -> CatalogResult<FormatRecord> {
        let tables = self.tables.read().await;
        tables
            .formats
            .iter()
            .find(|f| f.name == name)
            .cloned()
            .ok_or_else(|| CatalogError::not_found("format", name))
    }

    async fn bands(&self, format: &str) -> CatalogResult<Vec<BandRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bands
            .iter()
            .filter(|b| b.format == format)
            .cloned()
            .collect())
    }

    async fn categories(&self, band_id: i64) -> CatalogResult<Vec<CategoryRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .categories
            .iter()
            .filter(|c| c.band_id == band_id)
            .cloned()
            .collect())
    }

    async fn crs_definitions(&self, name: &str) -> CatalogResult<Vec<CrsRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.crs.iter().filter(|c| c.name == name).cloned().collect())
    }

    async fn find_coverages(&self, query: &CoverageQuery) -> CatalogResult<Vec<CoverageRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .coverages
            .iter()
            .filter(|c| c.matches(query))
            .cloned()
            .collect())
    }

    async fn find_coverages_named(
        &self,
        series: Option<&str>,
        filename: &str,
    ) -> CatalogResult<Vec<CoverageRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .coverages
            .iter()
            .filter(|c| c.filename == filename && series.map_or(true, |s| s == c.series))
            .cloned()
            .collect())
    }

    async fn descriptors_named(&self, name: &str) -> CatalogResult<Vec<DescriptorRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .descriptors
            .iter()
            .filter(|d| d.name == name)
            .cloned()
            .collect())
    }

    async fn descriptor_by_id(&self, id: i64) -> CatalogResult<Option<DescriptorRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.descriptors.iter().find(|d| d.id == id).cloned())
    }

    async fn linear_model(&self, target: &str) -> CatalogResult<Vec<LinearModelRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .linear_models
            .iter()
            .filter(|t| t.target == target)
            .cloned()
            .collect())
    }
}
