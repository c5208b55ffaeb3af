//! Configuration for catalog services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CatalogError, CatalogResult};
use crate::time::{parse_iso8601, TemporalCrs};

/// Configuration shared by every catalog built in a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Byte budget of strongly retained coverages, in megabytes.
    pub memory_budget_mb: usize,

    /// Smallest number of pixels read along either axis.
    pub min_tile_size: u32,

    /// Relative tolerance when comparing resolutions.
    pub resolution_epsilon: f64,

    /// Local directory holding the image files.
    pub root_directory: Option<String>,

    /// Base URL holding the image files, used when no directory is set.
    pub root_url: Option<String>,

    /// Origin of the temporal CRS used in envelopes.
    pub temporal_origin: DateTime<Utc>,

    /// PostgreSQL connection string.
    pub database_url: Option<String>,

    /// Size of the database connection pool.
    pub max_connections: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            memory_budget_mb: 128,
            min_tile_size: 64,
            resolution_epsilon: 1e-6,
            root_directory: None,
            root_url: None,
            temporal_origin: TemporalCrs::default().origin,
            database_url: None,
            max_connections: 10,
        }
    }
}

impl CatalogConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(value) = parse_env("COVERAGE_MEMORY_BUDGET_MB") {
            config.memory_budget_mb = value;
        }

        if let Some(value) = parse_env("COVERAGE_MIN_TILE_SIZE") {
            config.min_tile_size = value;
        }

        if let Some(value) = parse_env("COVERAGE_RESOLUTION_EPSILON") {
            config.resolution_epsilon = value;
        }

        if let Ok(val) = std::env::var("COVERAGE_ROOT_DIRECTORY") {
            config.root_directory = Some(val);
        }

        if let Ok(val) = std::env::var("COVERAGE_ROOT_URL") {
            config.root_url = Some(val);
        }

        if let Ok(val) = std::env::var("COVERAGE_TEMPORAL_ORIGIN") {
            match parse_iso8601(&val) {
                Ok(origin) => config.temporal_origin = origin,
                Err(e) => warn!(error = %e, "Ignoring COVERAGE_TEMPORAL_ORIGIN"),
            }
        }

        if let Ok(val) = std::env::var("DATABASE_URL") {
            config.database_url = Some(val);
        }

        if let Some(value) = parse_env("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = value;
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CatalogResult<()> {
        if self.memory_budget_mb == 0 {
            return Err(CatalogError::Config("memory_budget_mb must be > 0".to_string()));
        }

        if self.min_tile_size == 0 {
            return Err(CatalogError::Config("min_tile_size must be > 0".to_string()));
        }

        if !self.resolution_epsilon.is_finite() || self.resolution_epsilon < 0.0 {
            return Err(CatalogError::Config(
                "resolution_epsilon must be a finite, non-negative number".to_string(),
            ));
        }

        if self.max_connections == 0 {
            return Err(CatalogError::Config("max_connections must be > 0".to_string()));
        }

        Ok(())
    }

    /// Validate that image files can be located.
    pub fn require_source_root(&self) -> CatalogResult<()> {
        if self.root_directory.is_none() && self.root_url.is_none() {
            return Err(CatalogError::Config(
                "either root_directory or root_url must be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the memory budget in bytes.
    pub fn memory_budget_bytes(&self) -> usize {
        self.memory_budget_mb * 1024 * 1024
    }

    pub fn temporal_crs(&self) -> TemporalCrs {
        TemporalCrs::new(self.temporal_origin)
    }
}

/// Parse an environment variable, ignoring it with a warning when malformed.
fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %value, "Ignoring unparsable environment variable");
            None
        }
    }
}
