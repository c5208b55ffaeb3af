//! Persistence collaborator for the coverage catalog.
//!
//! Provides:
//! - Record types mirroring the catalog tables
//! - The `CatalogStore` trait consumed by the catalog core
//! - A PostgreSQL implementation
//! - An in-memory implementation for tests and embedded use

pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use memory::MemoryCatalogStore;
pub use postgres::PgCatalogStore;
pub use records::{
    BandRecord, CategoryRecord, CoverageQuery, CoverageRecord, CrsRecord, DescriptorRecord,
    FormatRecord, LinearModelRecord, SeriesRecord,
};
pub use store::CatalogStore;
