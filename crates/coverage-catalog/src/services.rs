//! Process-wide services shared by every catalog.

use std::sync::Arc;

use tracing::info;

use catalog_store::CatalogStore;
use coverage_common::{BasicGeodesy, CatalogConfig, CatalogResult, Geodesy};

use crate::decoder::{ImageRasterDecoder, RasterSources};
use crate::entry::CoverageEntry;
use crate::format::FormatTable;
use crate::memory::CoverageMemory;
use crate::parameters::Parameters;
use crate::pool::WeakPool;
use crate::raster::RasterDecoder;

/// What an entry needs to turn a reference into pixels.
pub struct CoverageReader {
    pub decoder: Arc<dyn RasterDecoder>,
    pub sources: RasterSources,
    pub memory: Arc<CoverageMemory>,
}

impl std::fmt::Debug for CoverageReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverageReader")
            .field("sources", &self.sources)
            .field("memory", &self.memory)
            .finish()
    }
}

/// Services created once at start-up and injected into every catalog.
pub struct CatalogServices {
    pub config: CatalogConfig,
    pub store: Arc<dyn CatalogStore>,
    pub geodesy: Arc<dyn Geodesy>,
    pub formats: FormatTable,
    pub reader: Arc<CoverageReader>,
    pub(crate) entries: WeakPool<CoverageEntry>,
    pub(crate) parameters: WeakPool<Parameters>,
}

impl CatalogServices {
    pub fn builder(config: CatalogConfig, store: Arc<dyn CatalogStore>) -> CatalogServicesBuilder {
        CatalogServicesBuilder {
            config,
            store,
            sources: None,
            decoder: None,
            geodesy: None,
            memory: None,
        }
    }

    pub fn memory(&self) -> &Arc<CoverageMemory> {
        &self.reader.memory
    }

    /// Number of live pooled entries.
    pub fn live_entries(&self) -> usize {
        self.entries.len()
    }
}

impl std::fmt::Debug for CatalogServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogServices")
            .field("config", &self.config)
            .field("reader", &self.reader)
            .finish()
    }
}

pub struct CatalogServicesBuilder {
    config: CatalogConfig,
    store: Arc<dyn CatalogStore>,
    sources: Option<RasterSources>,
    decoder: Option<Arc<dyn RasterDecoder>>,
    geodesy: Option<Arc<dyn Geodesy>>,
    memory: Option<Arc<CoverageMemory>>,
}

impl CatalogServicesBuilder {
    pub fn sources(mut self, sources: RasterSources) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn RasterDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn geodesy(mut self, geodesy: Arc<dyn Geodesy>) -> Self {
        self.geodesy = Some(geodesy);
        self
    }

    /// Share a memory budget with other services.
    pub fn memory(mut self, memory: Arc<CoverageMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn build(self) -> CatalogResult<Arc<CatalogServices>> {
        self.config.validate()?;
        let sources = match self.sources {
            Some(sources) => sources,
            None => RasterSources::from_config(&self.config)?,
        };
        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(CoverageMemory::from_config(&self.config)));
        info!(
            sources = ?sources,
            budget = memory.budget(),
            min_tile_size = self.config.min_tile_size,
            "Catalog services ready"
        );

        let reader = Arc::new(CoverageReader {
            decoder: self.decoder.unwrap_or_else(|| Arc::new(ImageRasterDecoder)),
            sources,
            memory,
        });
        Ok(Arc::new(CatalogServices {
            formats: FormatTable::new(self.store.clone()),
            geodesy: self.geodesy.unwrap_or_else(|| Arc::new(BasicGeodesy)),
            store: self.store,
            config: self.config,
            reader,
            entries: WeakPool::new(),
            parameters: WeakPool::new(),
        }))
    }
}
