//! Catalog store backed by PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use tracing::{debug, info};

use coverage_common::{BoundingBox, CatalogError, CatalogResult};

use crate::records::{
    BandRecord, CategoryRecord, CoverageQuery, CoverageRecord, CrsRecord, DescriptorRecord,
    FormatRecord, LinearModelRecord, SeriesRecord,
};
use crate::store::CatalogStore;

/// Database connection pool and catalog queries.
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    /// Create a new catalog connection from database URL.
    pub async fn connect(database_url: &str, max_connections: u32) -> CatalogResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| CatalogError::database(format!("Connection failed: {}", e)))?;

        info!(max_connections, "Connected to coverage catalog");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the catalog tables if they do not exist.
    pub async fn migrate(&self) -> CatalogResult<()> {
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| CatalogError::database(format!("Migration failed: {}", e)))?;
            }
        }

        Ok(())
    }

    /// Register a coverage, replacing a previous row with the same
    /// series, filename and image index.
    pub async fn register_coverage(&self, record: &CoverageRecord) -> CatalogResult<()> {
        sqlx::query(
            r#"
            INSERT INTO coverages (
                series, subseries, filename, image_index,
                start_time, end_time,
                west, south, east, north,
                width, height, crs, format
            ) VALUES (
                $1, $2, $3, $4,
                $5, $6,
                $7, $8, $9, $10,
                $11, $12, $13, $14
            )
            ON CONFLICT (series, filename, image_index)
            DO UPDATE SET
                subseries = EXCLUDED.subseries,
                start_time = EXCLUDED.start_time,
                end_time = EXCLUDED.end_time,
                west = EXCLUDED.west,
                south = EXCLUDED.south,
                east = EXCLUDED.east,
                north = EXCLUDED.north,
                width = EXCLUDED.width,
                height = EXCLUDED.height,
                crs = EXCLUDED.crs,
                format = EXCLUDED.format
            "#,
        )
        .bind(&record.series)
        .bind(&record.subseries)
        .bind(&record.filename)
        .bind(record.index)
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.bbox.min_x)
        .bind(record.bbox.min_y)
        .bind(record.bbox.max_x)
        .bind(record.bbox.max_y)
        .bind(record.width)
        .bind(record.height)
        .bind(&record.crs)
        .bind(&record.format)
        .execute(&self.pool)
        .await
        .map_err(|e| CatalogError::database(format!("Insert failed: {}", e)))?;

        Ok(())
    }
}

fn query_failed(e: sqlx::Error) -> CatalogError {
    CatalogError::database(format!("Query failed: {}", e))
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn series(&self, name: &str) -> CatalogResult<SeriesRecord> {
        let row = sqlx::query_as::<_, SeriesRow>(
            "SELECT name, path, format FROM series WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        row.map(Into::into)
            .ok_or_else(|| CatalogError::not_found("series", name))
    }

    async fn format(&self, name: &str) -> CatalogResult<FormatRecord> {
        let row = sqlx::query_as::<_, FormatRow>(
            "SELECT name, mime_type, extension, geophysics FROM formats WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        row.map(Into::into)
            .ok_or_else(|| CatalogError::not_found("format", name))
    }

    async fn bands(&self, format: &str) -> CatalogResult<Vec<BandRecord>> {
        let rows = sqlx::query_as::<_, BandRow>(
            "SELECT id, format, band, name, units FROM bands WHERE format = $1 ORDER BY band",
        )
        .bind(format)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn categories(&self, band_id: i64) -> CatalogResult<Vec<CategoryRecord>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT band_id, name, lower, upper, c0, c1, log, colors FROM categories \
             WHERE band_id = $1 ORDER BY lower",
        )
        .bind(band_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn crs_definitions(&self, name: &str) -> CatalogResult<Vec<CrsRecord>> {
        let rows = sqlx::query_as::<_, CrsRow>("SELECT name, definition FROM crs WHERE name = $1")
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_coverages(&self, query: &CoverageQuery) -> CatalogResult<Vec<CoverageRecord>> {
        // Inclusive bounds here; the exact half-open semantics are applied below.
        let rows = sqlx::query_as::<_, CoverageRow>(
            "SELECT series, subseries, filename, image_index, start_time, end_time, \
             west, south, east, north, width, height, crs, format FROM coverages \
             WHERE ($1::TEXT IS NULL OR series = $1) \
             AND start_time <= $3 AND end_time >= $2 \
             AND west <= $6 AND east >= $4 AND south <= $7 AND north >= $5 \
             ORDER BY start_time, series, filename, image_index",
        )
        .bind(query.series.as_deref())
        .bind(query.time_range.start)
        .bind(query.time_range.end)
        .bind(query.bbox.min_x)
        .bind(query.bbox.min_y)
        .bind(query.bbox.max_x)
        .bind(query.bbox.max_y)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        let records: Vec<CoverageRecord> = rows
            .into_iter()
            .map(CoverageRecord::from)
            .filter(|r| r.matches(query))
            .collect();

        debug!(count = records.len(), series = ?query.series, "Coverage query");
        Ok(records)
    }

    async fn find_coverages_named(
        &self,
        series: Option<&str>,
        filename: &str,
    ) -> CatalogResult<Vec<CoverageRecord>> {
        let rows = sqlx::query_as::<_, CoverageRow>(
            "SELECT series, subseries, filename, image_index, start_time, end_time, \
             west, south, east, north, width, height, crs, format FROM coverages \
             WHERE filename = $2 AND ($1::TEXT IS NULL OR series = $1)",
        )
        .bind(series)
        .bind(filename)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn descriptors_named(&self, name: &str) -> CatalogResult<Vec<DescriptorRecord>> {
        let rows = sqlx::query_as::<_, DescriptorRow>(
            "SELECT id, name, phenomenon, procedure, band, dt, dx, dy, dz, distribution \
             FROM descriptors WHERE name = $1",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn descriptor_by_id(&self, id: i64) -> CatalogResult<Option<DescriptorRecord>> {
        let row = sqlx::query_as::<_, DescriptorRow>(
            "SELECT id, name, phenomenon, procedure, band, dt, dx, dy, dz, distribution \
             FROM descriptors WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(row.map(Into::into))
    }

    async fn linear_model(&self, target: &str) -> CatalogResult<Vec<LinearModelRecord>> {
        let rows = sqlx::query_as::<_, LinearModelRow>(
            "SELECT target, coefficient, descriptors FROM linear_models \
             WHERE target = $1 ORDER BY position",
        )
        .bind(target)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// Internal row types for database queries.

#[derive(FromRow)]
struct SeriesRow {
    name: String,
    path: String,
    format: String,
}

impl From<SeriesRow> for SeriesRecord {
    fn from(row: SeriesRow) -> Self {
        SeriesRecord {
            name: row.name,
            path: row.path,
            format: row.format,
        }
    }
}

#[derive(FromRow)]
struct FormatRow {
    name: String,
    mime_type: String,
    extension: String,
    geophysics: bool,
}

impl From<FormatRow> for FormatRecord {
    fn from(row: FormatRow) -> Self {
        FormatRecord {
            name: row.name,
            mime_type: row.mime_type,
            extension: row.extension,
            geophysics: row.geophysics,
        }
    }
}

#[derive(FromRow)]
struct BandRow {
    id: i64,
    format: String,
    band: i32,
    name: String,
    units: Option<String>,
}

impl From<BandRow> for BandRecord {
    fn from(row: BandRow) -> Self {
        BandRecord {
            id: row.id,
            format: row.format,
            band: row.band,
            name: row.name,
            units: row.units,
        }
    }
}

#[derive(FromRow)]
struct CategoryRow {
    band_id: i64,
    name: String,
    lower: i32,
    upper: i32,
    c0: Option<f64>,
    c1: Option<f64>,
    log: bool,
    colors: Option<String>,
}

impl From<CategoryRow> for CategoryRecord {
    fn from(row: CategoryRow) -> Self {
        CategoryRecord {
            band_id: row.band_id,
            name: row.name,
            lower: row.lower,
            upper: row.upper,
            c0: row.c0,
            c1: row.c1,
            log: row.log,
            colors: row.colors,
        }
    }
}

#[derive(FromRow)]
struct CrsRow {
    name: String,
    definition: String,
}

impl From<CrsRow> for CrsRecord {
    fn from(row: CrsRow) -> Self {
        CrsRecord {
            name: row.name,
            definition: row.definition,
        }
    }
}

#[derive(FromRow)]
struct CoverageRow {
    series: String,
    subseries: String,
    filename: String,
    image_index: i32,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    west: f64,
    south: f64,
    east: f64,
    north: f64,
    width: i32,
    height: i32,
    crs: String,
    format: String,
}

impl From<CoverageRow> for CoverageRecord {
    fn from(row: CoverageRow) -> Self {
        CoverageRecord {
            series: row.series,
            subseries: row.subseries,
            filename: row.filename,
            index: row.image_index,
            start_time: row.start_time,
            end_time: row.end_time,
            bbox: BoundingBox::new(row.west, row.south, row.east, row.north),
            width: row.width,
            height: row.height,
            crs: row.crs,
            format: row.format,
        }
    }
}

#[derive(FromRow)]
struct DescriptorRow {
    id: i64,
    name: String,
    phenomenon: String,
    procedure: String,
    band: i16,
    dt: f64,
    dx: f64,
    dy: f64,
    dz: f64,
    distribution: String,
}

impl From<DescriptorRow> for DescriptorRecord {
    fn from(row: DescriptorRow) -> Self {
        DescriptorRecord {
            id: row.id,
            name: row.name,
            phenomenon: row.phenomenon,
            procedure: row.procedure,
            band: row.band,
            dt: row.dt,
            dx: row.dx,
            dy: row.dy,
            dz: row.dz,
            distribution: row.distribution,
        }
    }
}

#[derive(FromRow)]
struct LinearModelRow {
    target: String,
    coefficient: f64,
    descriptors: Vec<String>,
}

impl From<LinearModelRow> for LinearModelRecord {
    fn from(row: LinearModelRow) -> Self {
        LinearModelRecord {
            target: row.target,
            coefficient: row.coefficient,
            descriptors: row.descriptors,
        }
    }
}

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS formats (
    name VARCHAR(50) PRIMARY KEY,
    mime_type VARCHAR(100) NOT NULL,
    extension VARCHAR(10) NOT NULL,
    geophysics BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS bands (
    id BIGSERIAL PRIMARY KEY,
    format VARCHAR(50) NOT NULL REFERENCES formats(name),
    band INTEGER NOT NULL,
    name VARCHAR(100) NOT NULL,
    units VARCHAR(50),

    UNIQUE(format, band)
);

CREATE TABLE IF NOT EXISTS categories (
    band_id BIGINT NOT NULL REFERENCES bands(id),
    name VARCHAR(100) NOT NULL,
    lower INTEGER NOT NULL,
    upper INTEGER NOT NULL,
    c0 DOUBLE PRECISION,
    c1 DOUBLE PRECISION,
    log BOOLEAN NOT NULL DEFAULT FALSE,
    colors TEXT,

    UNIQUE(band_id, lower)
);

CREATE TABLE IF NOT EXISTS series (
    name VARCHAR(100) PRIMARY KEY,
    path TEXT NOT NULL,
    format VARCHAR(50) NOT NULL REFERENCES formats(name)
);

CREATE TABLE IF NOT EXISTS crs (
    name VARCHAR(100) NOT NULL,
    definition TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS coverages (
    series VARCHAR(100) NOT NULL REFERENCES series(name),
    subseries VARCHAR(100) NOT NULL DEFAULT '',
    filename VARCHAR(200) NOT NULL,
    image_index INTEGER NOT NULL DEFAULT 0,
    start_time TIMESTAMPTZ NOT NULL,
    end_time TIMESTAMPTZ NOT NULL,
    west DOUBLE PRECISION NOT NULL,
    south DOUBLE PRECISION NOT NULL,
    east DOUBLE PRECISION NOT NULL,
    north DOUBLE PRECISION NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    crs VARCHAR(100) NOT NULL,
    format VARCHAR(50) NOT NULL REFERENCES formats(name),

    UNIQUE(series, filename, image_index)
);

CREATE INDEX IF NOT EXISTS idx_coverages_time ON coverages(start_time, end_time);
CREATE INDEX IF NOT EXISTS idx_coverages_series ON coverages(series);

CREATE TABLE IF NOT EXISTS descriptors (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    phenomenon VARCHAR(100) NOT NULL,
    procedure VARCHAR(100) NOT NULL,
    band SMALLINT NOT NULL DEFAULT 1,
    dt DOUBLE PRECISION NOT NULL DEFAULT 0,
    dx DOUBLE PRECISION NOT NULL DEFAULT 0,
    dy DOUBLE PRECISION NOT NULL DEFAULT 0,
    dz DOUBLE PRECISION NOT NULL DEFAULT 0,
    distribution VARCHAR(50) NOT NULL DEFAULT 'normal'
);

CREATE INDEX IF NOT EXISTS idx_descriptors_name ON descriptors(name);

CREATE TABLE IF NOT EXISTS linear_models (
    target VARCHAR(100) NOT NULL,
    position INTEGER NOT NULL,
    coefficient DOUBLE PRECISION NOT NULL,
    descriptors TEXT[] NOT NULL,

    UNIQUE(target, position)
)
"#;
