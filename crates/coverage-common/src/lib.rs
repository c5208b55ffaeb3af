//! Common types and utilities shared across the coverage catalog crates.

pub mod bbox;
pub mod config;
pub mod crs;
pub mod envelope;
pub mod error;
pub mod time;

pub use bbox::BoundingBox;
pub use config::CatalogConfig;
pub use crs::{BasicGeodesy, CoordinateTransform, Crs, CrsCode, Geodesy};
pub use envelope::Envelope;
pub use error::{CatalogError, CatalogResult};
pub use time::{TemporalCrs, TimeRange};
