//! # Switchboard Storage
//!
//! Authoritative store access and the in-process snapshot cache for
//! Switchboard.
//!
//! ## Architecture
//!
//! - **Authoritative store**: the flag corpus lives in PostgreSQL
//!   (production) or SQLite (development, single node) and is read in full
//!   with [`CorpusStore::load_all`] under one transaction.
//! - **Snapshot cache**: [`SnapshotCache`] compiles each load into an
//!   immutable [`switchboard_core::Snapshot`] and publishes it through a
//!   lock-free atomic pointer swap; evaluators never take a lock.
//! - **Background reload**: [`spawn_refresher`] re-reads the store on a
//!   configurable interval and keeps the previous snapshot on any failure.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use switchboard_storage::{Database, DatabaseConfig, SnapshotCache, spawn_refresher};
//!
//! let db = Database::connect(&DatabaseConfig::postgres("postgres://localhost/switchboard")).await?;
//! let cache = Arc::new(SnapshotCache::new());
//! cache.refresh(&db).await?;
//! let handle = spawn_refresher(cache.clone(), db, Duration::from_secs(30), shutdown_rx);
//! ```

pub mod cache;
pub mod db;
pub mod error;
pub mod traits;

// Re-exports
pub use cache::{spawn_refresher, SnapshotCache};
pub use db::{Database, DatabaseConfig, DatabaseType};
pub use error::{StorageError, StorageResult};
pub use traits::CorpusStore;
