//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use catalog_store::CatalogStore;
use coverage_catalog::{CatalogServices, CoverageTable, FormatTable, LinearModelTable, Operation};
use coverage_common::{BoundingBox, TimeRange};

/// Query options shared by `entries` and `read`.
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Series name; every series when absent
    #[arg(long)]
    pub series: Option<String>,

    /// Time range "start/end" or a single ISO 8601 time
    #[arg(long)]
    pub time: Option<String>,

    /// Area "min_lon,min_lat,max_lon,max_lat"
    #[arg(long)]
    pub bbox: Option<String>,

    /// Preferred resolution "dx,dy" in degrees per pixel
    #[arg(long)]
    pub resolution: Option<String>,
}

impl QueryArgs {
    async fn table(&self, services: Arc<CatalogServices>) -> Result<CoverageTable> {
        let table = match &self.series {
            Some(series) => CoverageTable::for_series(services, series.clone()),
            None => CoverageTable::new(services),
        };
        if let Some(time) = &self.time {
            table.set_time_range(TimeRange::parse(time)?).await;
        }
        if let Some(bbox) = &self.bbox {
            table.set_geographic_bounding_box(BoundingBox::parse(bbox)?).await;
        }
        if let Some(resolution) = &self.resolution {
            table.set_preferred_resolution(Some(parse_pair(resolution)?)).await;
        }
        Ok(table)
    }
}

fn parse_pair(s: &str) -> Result<(f64, f64)> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| anyhow!("expected \"dx,dy\", got '{}'", s))?;
    Ok((x.trim().parse()?, y.trim().parse()?))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn entries(services: Arc<CatalogServices>, query: &QueryArgs) -> Result<()> {
    let temporal = services.config.temporal_crs();
    let table = query.table(services).await?;
    let entries = table.entries().await?;
    info!(count = entries.len(), "Listed entries");

    let listing: Vec<_> = entries
        .iter()
        .map(|entry| {
            json!({
                "reference": entry.reference(),
                "resolution": entry.resolution(),
            })
        })
        .collect();
    print_json(&listing)?;

    if let Some(envelope) = table.envelope().await? {
        eprintln!(
            "{} entries, {} to {}, ordinates {:?}",
            entries.len(),
            envelope.time.start,
            envelope.time.end,
            envelope.to_ordinates(&temporal)
        );
    }
    Ok(())
}

pub async fn bands(store: Arc<dyn CatalogStore>, format: &str) -> Result<()> {
    let formats = FormatTable::new(store);
    let bands = formats.bands(format).await?;
    let summaries: Vec<_> = bands.iter().map(|band| band.summary()).collect();
    print_json(&summaries)
}

pub async fn read(
    services: Arc<CatalogServices>,
    query: &QueryArgs,
    name: Option<&str>,
    operation: Option<&str>,
) -> Result<()> {
    let table = query.table(services.clone()).await?;
    if let Some(operation) = operation {
        table.set_operation(Some(operation.parse::<Operation>()?)).await;
    }

    let entry = match name {
        Some(name) => table.entry_named(Some(name)).await?,
        None => table.entry().await?,
    }
    .context("no entry matches the query")?;

    let Some(coverage) = entry.coverage().await? else {
        warn!(entry = %entry, "Entry does not overlap the requested area");
        return print_json(&json!({ "entry": entry.name(), "coverage": null }));
    };

    let bands: Vec<_> = (0..coverage.band_count())
        .map(|b| {
            let range = coverage.value_range(b);
            json!({
                "band": b + 1,
                "name": coverage.bands.get(b).map(|d| d.name.clone()),
                "min": range.map(|r| r.0),
                "max": range.map(|r| r.1),
            })
        })
        .collect();
    print_json(&json!({
        "entry": entry.name(),
        "crs": coverage.crs.code.to_string(),
        "bbox": coverage.bbox,
        "time": coverage.time_range,
        "width": coverage.width,
        "height": coverage.height,
        "bands": bands,
        "bytes": coverage.byte_size(),
        "decodes": services.memory().stats().decodes.load(std::sync::atomic::Ordering::Relaxed),
    }))
}

pub async fn evaluate(store: Arc<dyn CatalogStore>, target: &str, values: &[f64]) -> Result<()> {
    let models = LinearModelTable::new(store);
    let model = models
        .model(target)
        .await?
        .with_context(|| format!("no linear model computes '{}'", target))?;

    println!("{}", model);
    let descriptors: Vec<String> = model.descriptors().iter().map(|d| d.name.clone()).collect();
    if values.is_empty() {
        println!("descriptors: {}", descriptors.join(", "));
        return Ok(());
    }

    let value = model.evaluate(values)?;
    println!("{} = {}", model.target(), value);
    Ok(())
}
