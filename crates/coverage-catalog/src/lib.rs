//! Grid Coverage Catalog
//!
//! This crate turns catalog records into decoded, geophysical coverages.
//! It provides:
//!
//! - **Coverage tables**: configurable views (series, time, area, resolution)
//!   returning pooled entries
//! - **Lazy decoding**: an entry decodes only the pixels its table needs,
//!   sub-sampled to the preferred resolution
//! - **Bounded caching**: decoded coverages share one byte budget and are
//!   demoted to weak retention once it is exceeded
//! - **Formats and bands**: sample dimensions and categories converting
//!   packed samples to geophysical values
//! - **Linear models**: descriptor-based models with substitution and evaluation
//!
//! # Architecture
//!
//! ```text
//! CoverageTable::entries()
//!      │
//!      ├─► CatalogStore query (series, time, box)
//!      │
//!      ├─► CoverageReference + Parameters, pooled
//!      │
//!      └─► One CoverageEntry per spatio-temporal identity
//!               │
//!               ▼
//!          CoverageEntry::coverage()
//!               │
//!               ├─► region computation
//!               ├─► RasterDecoder under the format lock
//!               └─► CoverageMemory byte budget
//! ```
//!
//! # Example
//!
//! ```ignore
//! use coverage_catalog::{CatalogServices, CoverageTable};
//!
//! let services = CatalogServices::builder(config, store).build()?;
//! let table = CoverageTable::for_series(services, "SST");
//! table.set_geographic_bounding_box(BoundingBox::new(-10.0, 30.0, 10.0, 50.0)).await;
//!
//! if let Some(entry) = table.entry().await? {
//!     if let Some(coverage) = entry.coverage().await? {
//!         println!("{} x {}", coverage.width, coverage.height);
//!     }
//! }
//! ```

use std::sync::{Mutex, MutexGuard};

pub mod category;
pub mod comparator;
pub mod coverage;
pub mod decoder;
pub mod descriptor;
pub mod entry;
pub mod format;
pub mod linear_model;
pub mod memory;
pub mod operation;
pub mod parameters;
pub mod pool;
pub mod raster;
pub mod reference;
pub mod region;
pub mod services;
pub mod table;

// Re-export commonly used types at crate root
pub use category::{parse_palette, Category, CategoryKind, SampleDimension, SampleTransform};
pub use comparator::CoverageComparator;
pub use coverage::GridCoverage;
pub use decoder::{ImageRasterDecoder, RasterSources};
pub use descriptor::{Descriptor, DescriptorTable, Distribution, LocationOffset};
pub use entry::CoverageEntry;
pub use format::{FormatEntry, FormatTable};
pub use linear_model::{LinearModel, LinearModelTable, Term};
pub use memory::{CoverageMemory, MemoryStats};
pub use operation::{InterpolationMethod, Operation};
pub use parameters::Parameters;
pub use pool::WeakPool;
pub use raster::{AbortFlag, PixelBuffer, PixelRect, RasterDecoder, RasterImage, ReadParams, SampleType};
pub use reference::CoverageReference;
pub use region::{compute_region, ReadRegion, RegionRequest};
pub use services::{CatalogServices, CatalogServicesBuilder, CoverageReader};
pub use table::CoverageTable;

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
