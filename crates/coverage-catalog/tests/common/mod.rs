//! Common helpers for coverage-catalog integration tests
//!
//! Provides:
//! - Decoders that count, delay or hold their calls
//! - Services over an in-memory catalog and a temporary source tree

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use catalog_store::{CatalogStore, MemoryCatalogStore};
use coverage_catalog::{
    AbortFlag, CatalogServices, CoverageMemory, ImageRasterDecoder, RasterDecoder, RasterImage,
    ReadParams,
};
use coverage_common::{CatalogConfig, CatalogError, CatalogResult};
use test_utils::SourceTree;

/// Image decoder that counts its calls.
#[derive(Debug, Default)]
pub struct CountingDecoder {
    calls: AtomicUsize,
}

impl CountingDecoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RasterDecoder for CountingDecoder {
    fn decode(&self, bytes: &[u8], params: &ReadParams, abort: &AbortFlag) -> CatalogResult<RasterImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ImageRasterDecoder.decode(bytes, params, abort)
    }
}

/// Decoder that announces it started, then spins until aborted.
#[derive(Debug, Default)]
pub struct StallingDecoder {
    pub started: Notify,
}

impl RasterDecoder for StallingDecoder {
    fn decode(&self, _bytes: &[u8], _params: &ReadParams, abort: &AbortFlag) -> CatalogResult<RasterImage> {
        self.started.notify_one();
        while !abort.is_aborted() {
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(CatalogError::io("decode aborted"))
    }
}

/// Image decoder that sleeps before decoding, counting its calls.
#[derive(Debug)]
pub struct SlowDecoder {
    pub delay: Duration,
    calls: AtomicUsize,
}

impl SlowDecoder {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RasterDecoder for SlowDecoder {
    fn decode(&self, bytes: &[u8], params: &ReadParams, abort: &AbortFlag) -> CatalogResult<RasterImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        ImageRasterDecoder.decode(bytes, params, abort)
    }
}

/// Services reading files from `tree`, with a byte budget.
pub fn services(
    store: MemoryCatalogStore,
    tree: &SourceTree,
    budget_bytes: usize,
    decoder: Arc<dyn RasterDecoder>,
) -> Arc<CatalogServices> {
    let config = CatalogConfig {
        root_directory: Some(tree.root_string()),
        ..CatalogConfig::default()
    };
    let store: Arc<dyn CatalogStore> = Arc::new(store);
    CatalogServices::builder(config, store)
        .decoder(decoder)
        .memory(Arc::new(CoverageMemory::new(budget_bytes)))
        .build()
        .unwrap()
}

/// Services with a generous budget and a counting decoder.
pub fn counting_services(store: MemoryCatalogStore, tree: &SourceTree) -> (Arc<CatalogServices>, Arc<CountingDecoder>) {
    let decoder = Arc::new(CountingDecoder::default());
    let services = services(store, tree, 64 * 1024 * 1024, decoder.clone());
    (services, decoder)
}
