//! The persistence trait consumed by the catalog core.

use async_trait::async_trait;

use coverage_common::CatalogResult;

use crate::records::{
    BandRecord, CategoryRecord, CoverageQuery, CoverageRecord, CrsRecord, DescriptorRecord,
    FormatRecord, LinearModelRecord, SeriesRecord,
};

/// Source of catalog rows.
///
/// Single-record lookups fail with `NotFound` when nothing matches. Lookups
/// that may legitimately match several rows return them all and leave the
/// ambiguity decision to the caller.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Get a series by name.
    async fn series(&self, name: &str) -> CatalogResult<SeriesRecord>;

    /// Get a format by name.
    async fn format(&self, name: &str) -> CatalogResult<FormatRecord>;

    /// Get the bands declared for a format, in no particular order.
    async fn bands(&self, format: &str) -> CatalogResult<Vec<BandRecord>>;

    /// Get the categories of one band, in no particular order.
    async fn categories(&self, band_id: i64) -> CatalogResult<Vec<CategoryRecord>>;

    /// Get every definition stored under a CRS name.
    async fn crs_definitions(&self, name: &str) -> CatalogResult<Vec<CrsRecord>>;

    /// Find coverages intersecting the query's time range and box.
    async fn find_coverages(&self, query: &CoverageQuery) -> CatalogResult<Vec<CoverageRecord>>;

    /// Find coverages by filename, optionally restricted to a series.
    async fn find_coverages_named(
        &self,
        series: Option<&str>,
        filename: &str,
    ) -> CatalogResult<Vec<CoverageRecord>>;

    /// Get every descriptor stored under a name.
    async fn descriptors_named(&self, name: &str) -> CatalogResult<Vec<DescriptorRecord>>;

    /// Get a descriptor by numeric identifier.
    async fn descriptor_by_id(&self, id: i64) -> CatalogResult<Option<DescriptorRecord>>;

    /// Get the terms of the linear model computing `target`. Empty when the
    /// series has no model.
    async fn linear_model(&self, target: &str) -> CatalogResult<Vec<LinearModelRecord>>;
}
