//! Coverage catalog inspector.
//!
//! Lists the entries of a series, shows format bands, reads a coverage and
//! evaluates linear models against a PostgreSQL catalog.

mod commands;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use object_store::memory::InMemory;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use catalog_store::{CatalogStore, PgCatalogStore};
use coverage_catalog::{CatalogServices, RasterSources};
use coverage_common::CatalogConfig;

#[derive(Parser, Debug)]
#[command(name = "coverage-cli")]
#[command(about = "Inspect a grid coverage catalog")]
struct Args {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Directory holding the image files
    #[arg(long, env = "COVERAGE_ROOT_DIRECTORY")]
    root_directory: Option<String>,

    /// Base URL holding the image files
    #[arg(long, env = "COVERAGE_ROOT_URL")]
    root_url: Option<String>,

    /// Log level
    #[arg(long, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the catalog tables
    Migrate,

    /// List the entries matching a query
    Entries(commands::QueryArgs),

    /// Show the bands of a format
    Bands {
        /// Format name
        format: String,
    },

    /// Read one coverage and print a summary of its values
    Read {
        #[command(flatten)]
        query: commands::QueryArgs,

        /// Entry name; the best matching entry when absent
        #[arg(long)]
        name: Option<String>,

        /// Operation applied after decoding, e.g. "nodata-filter:2"
        #[arg(long)]
        operation: Option<String>,
    },

    /// Print a linear model, or evaluate it with one value per descriptor
    Evaluate {
        /// Target series of the model
        target: String,

        /// Comma-separated descriptor values
        #[arg(long, value_delimiter = ',')]
        values: Vec<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let mut config = CatalogConfig::from_env();
    if args.database_url.is_some() {
        config.database_url = args.database_url.clone();
    }
    if args.root_directory.is_some() {
        config.root_directory = args.root_directory.clone();
    }
    if args.root_url.is_some() {
        config.root_url = args.root_url.clone();
    }
    config.validate()?;

    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL or --database-url is required")?;
    let pg = PgCatalogStore::connect(&database_url, config.max_connections).await?;
    info!(max_connections = config.max_connections, "Connected to catalog");

    if let Command::Migrate = args.command {
        pg.migrate().await?;
        println!("catalog tables ready");
        return Ok(());
    }

    let store: Arc<dyn CatalogStore> = Arc::new(pg);
    match args.command {
        Command::Migrate => Ok(()),
        Command::Entries(query) => {
            // Listing reads no pixels, so a missing file root is not an error here
            let mut builder = CatalogServices::builder(config.clone(), store);
            if config.require_source_root().is_err() {
                builder = builder.sources(RasterSources::new(Arc::new(InMemory::new()), "no file root"));
            }
            commands::entries(builder.build()?, &query).await
        }
        Command::Bands { format } => commands::bands(store, &format).await,
        Command::Read { query, name, operation } => {
            let services = CatalogServices::builder(config, store).build()?;
            commands::read(services, &query, name.as_deref(), operation.as_deref()).await
        }
        Command::Evaluate { target, values } => commands::evaluate(store, &target, &values).await,
    }
}
