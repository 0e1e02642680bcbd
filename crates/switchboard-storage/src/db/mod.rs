//! Database connection management and corpus assembly.

pub mod postgres;
pub mod sqlite;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Sqlite};

use switchboard_core::{Constraint, Distribution, Flag, Operator, Segment, Variant};

use crate::error::{StorageError, StorageResult};
use crate::traits::CorpusStore;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL (postgres:// or sqlite://).
    pub url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to keep open.
    pub min_connections: u32,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Idle timeout for connections in seconds.
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://switchboard.db?mode=rwc".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl DatabaseConfig {
    /// Creates a configuration from a connection URL, inferring the driver.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Creates a new PostgreSQL configuration.
    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 20,
            min_connections: 5,
            ..Default::default()
        }
    }

    /// Creates a new SQLite configuration.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            url: format!("sqlite://{}?mode=rwc", path.into()),
            max_connections: 5,
            min_connections: 1,
            ..Default::default()
        }
    }

    /// Creates an in-memory SQLite configuration (for testing).
    pub fn sqlite_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        }
    }

    /// Checks if this is a PostgreSQL configuration.
    pub fn is_postgres(&self) -> bool {
        self.url.starts_with("postgres://") || self.url.starts_with("postgresql://")
    }

    /// Checks if this is a SQLite configuration.
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite://") || self.url.starts_with("sqlite:")
    }
}

/// Database driver enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
}

/// A connection pool to the authoritative store.
#[derive(Debug, Clone)]
pub enum Database {
    Postgres(Pool<Postgres>),
    Sqlite(Pool<Sqlite>),
}

impl Database {
    /// Creates a new database connection from configuration.
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        if config.is_postgres() {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
                .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
                .connect(&config.url)
                .await?;
            Ok(Self::Postgres(pool))
        } else if config.is_sqlite() {
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
                .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
                .connect(&config.url)
                .await?;
            Ok(Self::Sqlite(pool))
        } else {
            Err(StorageError::Configuration(format!(
                "Unsupported database URL: {}",
                config.url
            )))
        }
    }

    /// Returns the database type.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            Self::Postgres(_) => DatabaseType::PostgreSQL,
            Self::Sqlite(_) => DatabaseType::SQLite,
        }
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        match self {
            Self::Postgres(pool) => pool.close().await,
            Self::Sqlite(pool) => pool.close().await,
        }
    }

    /// Checks if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        match self {
            Self::Postgres(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.is_ok(),
            Self::Sqlite(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.is_ok(),
        }
    }
}

impl CorpusStore for Database {
    async fn load_all(&self) -> StorageResult<Vec<Flag>> {
        match self {
            Self::Postgres(pool) => postgres::load_all(pool).await,
            Self::Sqlite(pool) => sqlite::load_all(pool).await,
        }
    }
}

// Raw row shapes shared by the backends; assembly is driver-independent.

pub(crate) struct FlagRow {
    pub id: i64,
    pub key: Option<String>,
    pub description: String,
    pub enabled: bool,
    pub data_record_type: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub notes: Option<String>,
}

pub(crate) struct VariantRow {
    pub id: i64,
    pub flag_id: i64,
    pub key: String,
    pub attachment: Option<JsonValue>,
}

pub(crate) struct SegmentRow {
    pub id: i64,
    pub flag_id: i64,
    pub description: String,
    pub rank: i64,
    pub rollout_percent: i64,
}

pub(crate) struct ConstraintRow {
    pub id: i64,
    pub segment_id: i64,
    pub property: String,
    pub operator: String,
    pub value: String,
}

pub(crate) struct DistributionRow {
    pub id: i64,
    pub segment_id: i64,
    pub variant_id: i64,
    pub variant_key: String,
    pub percent: i64,
}

/// Assembles flat rows into the nested corpus. Row order is preserved:
/// flag queries order by id, segment queries by (flag_id, rank, id), and
/// child queries by (parent, id).
pub(crate) fn assemble(
    flag_rows: Vec<FlagRow>,
    variant_rows: Vec<VariantRow>,
    segment_rows: Vec<SegmentRow>,
    constraint_rows: Vec<ConstraintRow>,
    distribution_rows: Vec<DistributionRow>,
) -> StorageResult<Vec<Flag>> {
    let mut flags = Vec::with_capacity(flag_rows.len());
    let mut flag_index: HashMap<i64, usize> = HashMap::with_capacity(flag_rows.len());
    for row in flag_rows {
        flag_index.insert(row.id, flags.len());
        let mut flag = Flag::new(row.id)
            .with_description(row.description)
            .with_enabled(row.enabled)
            .with_updated_at(row.updated_at);
        flag.key = row.key;
        flag.data_record_type = row.data_record_type;
        flag.notes = row.notes;
        flags.push(flag);
    }

    for row in variant_rows {
        let index = *flag_index.get(&row.flag_id).ok_or_else(|| {
            StorageError::corrupt(format!("variant {} references missing flag {}", row.id, row.flag_id))
        })?;
        let mut variant = Variant::new(row.id, row.key);
        variant.attachment = row.attachment;
        flags[index].variants.push(variant);
    }

    // segment id -> (flag index, segment index)
    let mut segment_index: HashMap<i64, (usize, usize)> =
        HashMap::with_capacity(segment_rows.len());
    for row in segment_rows {
        let index = *flag_index.get(&row.flag_id).ok_or_else(|| {
            StorageError::corrupt(format!("segment {} references missing flag {}", row.id, row.flag_id))
        })?;
        let rollout_percent = percent(row.rollout_percent, "segment", row.id)?;
        let segment = Segment::new(row.id, row.rank)
            .with_description(row.description)
            .with_rollout_percent(rollout_percent);
        segment_index.insert(row.id, (index, flags[index].segments.len()));
        flags[index].segments.push(segment);
    }

    for row in constraint_rows {
        let (flag_at, segment_at) = *segment_index.get(&row.segment_id).ok_or_else(|| {
            StorageError::corrupt(format!(
                "constraint {} references missing segment {}",
                row.id, row.segment_id
            ))
        })?;
        let operator = Operator::from_code(&row.operator).ok_or_else(|| {
            StorageError::corrupt(format!(
                "constraint {} has unknown operator {:?}",
                row.id, row.operator
            ))
        })?;
        flags[flag_at].segments[segment_at]
            .constraints
            .push(Constraint::new(row.id, row.property, operator, row.value));
    }

    for row in distribution_rows {
        let (flag_at, segment_at) = *segment_index.get(&row.segment_id).ok_or_else(|| {
            StorageError::corrupt(format!(
                "distribution {} references missing segment {}",
                row.id, row.segment_id
            ))
        })?;
        let share = percent(row.percent, "distribution", row.id)?;
        flags[flag_at].segments[segment_at].distributions.push(Distribution::new(
            row.id,
            row.variant_id,
            row.variant_key,
            share,
        ));
    }

    Ok(flags)
}

fn percent(raw: i64, entity: &str, id: i64) -> StorageResult<u8> {
    u8::try_from(raw)
        .ok()
        .filter(|value| *value <= 100)
        .ok_or_else(|| {
            StorageError::corrupt(format!("{} {} has out-of-range percent {}", entity, id, raw))
        })
}
