//! Storage traits and error types
//!
//! This module defines the trait interface for cache backends and
//! associated error types.

use crate::storage::{CacheStatistics, CachedBody};
use crate::ConfigError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache entry not found: row {0}")]
    EntryNotFound(i64),

    /// The recorded migration log is not a prefix of the known migrations
    #[error("Migration log diverged at position {position}: recorded {recorded:?}, expected {expected:?}")]
    MigrationMismatch {
        position: usize,
        recorded: String,
        expected: Option<String>,
    },

    #[error("Error performing migration {version}")]
    MigrationApply {
        version: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Schema changed but the log does not say so
    #[error("Migration {version} was applied but could not be recorded")]
    MigrationRecord {
        version: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Cache lock poisoned")]
    LockPoisoned,

    #[error("Invalid cache settings: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    /// Returns true if the database can no longer be trusted
    ///
    /// A migration log that disagrees with the schema has no safe recovery;
    /// callers must stop rather than keep writing.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MigrationMismatch { .. } | Self::MigrationRecord { .. } | Self::LockPoisoned
        )
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The two kinds of cached content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Story documents, keyed by `story-<id>`
    Page,
    /// Binary assets, keyed by URL path
    Asset,
}

impl CacheKind {
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Page => "cached_pages",
            Self::Asset => "cached_assets",
        }
    }
}

/// Result of a cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// No row exists for the key
    Missing,
    /// Row exists and may be served
    Fresh(i64),
    /// Row exists but must be re-fetched; the row id is reused on write-back
    Stale(i64),
}

impl CacheStatus {
    /// The row id, when a row exists
    pub fn row_id(&self) -> Option<i64> {
        match self {
            Self::Missing => None,
            Self::Fresh(id) | Self::Stale(id) => Some(*id),
        }
    }

    /// Returns true if the content has to come from the network
    pub fn needs_fetch(&self) -> bool {
        !matches!(self, Self::Fresh(_))
    }
}

/// Trait for cache backend implementations
///
/// This trait defines every cache operation the fetch layer needs.
/// Entries never expire physically; staleness is decided at read time.
pub trait CacheStore {
    /// Looks up a key and decides whether its row may be served
    ///
    /// # Arguments
    ///
    /// * `kind` - Which table to look in
    /// * `key` - The cache key
    /// * `now` - Reference time for the staleness check
    fn check_stale(&self, kind: CacheKind, key: &str, now: DateTime<Utc>)
        -> StorageResult<CacheStatus>;

    /// Reads the payload of a row returned by `check_stale`
    fn read(&self, kind: CacheKind, row_id: i64) -> StorageResult<CachedBody>;

    /// Writes a payload back to the cache
    ///
    /// With a row id the existing row is updated in place; without one the
    /// key is inserted, or updated if another writer inserted it first.
    ///
    /// # Returns
    ///
    /// The id of the row that now holds the payload
    fn write(
        &mut self,
        kind: CacheKind,
        row_id: Option<i64>,
        key: &str,
        body: &[u8],
        content_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> StorageResult<i64>;

    /// Returns every cached page whose body contains `needle`
    ///
    /// This is a linear scan over all page bodies: O(total cached bytes)
    /// per query, with no index.
    fn pages_containing(&self, needle: &[u8]) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// Returns the keys of every cached page whose body contains `needle`
    fn search_fulltext(&self, needle: &[u8]) -> StorageResult<Vec<String>> {
        Ok(self
            .pages_containing(needle)?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    /// Returns the applied migration versions in order
    fn applied_migrations(&self) -> StorageResult<Vec<String>>;

    /// Gets summary statistics about the cache contents
    fn statistics(&self) -> StorageResult<CacheStatistics>;
}
