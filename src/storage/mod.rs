//! Storage module for the local page and asset cache
//!
//! This module handles all database operations for the fetch layer, including:
//! - SQLite database initialization and append-only schema migrations
//! - Page and asset lookups with a read-time staleness policy
//! - Upserting writes that reuse the existing row on refresh
//! - Linear full-text scans over cached pages
//! - Per-key locks serializing concurrent refreshes

mod locks;
mod schema;
mod sqlite;
mod traits;

pub use locks::{KeyGuard, KeyLocks};
pub use schema::{apply_migrations, Migration, MIGRATIONS};
pub use sqlite::SqliteCache;
pub use traits::{CacheKind, CacheStatus, CacheStore, StorageError, StorageResult};

use crate::config::CacheConfig;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Cache handle shared between workers
pub type SharedCache = Arc<Mutex<SqliteCache>>;

/// Locks the shared cache, surfacing a poisoned lock as an error
pub fn lock_cache(cache: &SharedCache) -> StorageResult<MutexGuard<'_, SqliteCache>> {
    cache.lock().map_err(|_| StorageError::LockPoisoned)
}

/// Initializes or opens the cache database
///
/// # Arguments
///
/// * `config` - Cache section of the configuration
///
/// # Returns
///
/// * `Ok(SqliteCache)` - Successfully initialized cache
/// * `Err(StorageError)` - Failed to open or migrate the database
pub fn open_cache(config: &CacheConfig) -> StorageResult<SqliteCache> {
    SqliteCache::open(Path::new(&config.database_path), CachePolicy::from_config(config)?)
}

/// Read-time staleness policy
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub stale_period: chrono::Duration,
    /// When set, existing entries are always served
    pub offline: bool,
}

impl CachePolicy {
    pub fn from_config(config: &CacheConfig) -> StorageResult<Self> {
        Ok(Self {
            stale_period: config.stale_period()?,
            offline: config.offline,
        })
    }
}

/// Payload of a cache row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBody {
    pub body: Vec<u8>,
    /// Only set for assets
    pub content_type: Option<String>,
}

/// Summary of the cache contents
#[derive(Debug, Clone, Default)]
pub struct CacheStatistics {
    pub page_count: u64,
    pub page_bytes: u64,
    pub asset_count: u64,
    pub asset_bytes: u64,
    /// RFC 3339 time of the least recently fetched page
    pub oldest_page: Option<String>,
    pub migrations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_config() {
        let config = CacheConfig {
            stale_period_hours: 24,
            offline: true,
            ..CacheConfig::default()
        };
        let policy = CachePolicy::from_config(&config).unwrap();
        assert_eq!(policy.stale_period, chrono::Duration::hours(24));
        assert!(policy.offline);
    }

    #[test]
    fn test_open_cache_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            database_path: dir.path().join("c.db").to_string_lossy().into_owned(),
            ..CacheConfig::default()
        };
        let cache = open_cache(&config).unwrap();
        assert!(!cache.policy().offline);
        assert!(dir.path().join("c.db").exists());
    }

    #[test]
    fn test_open_cache_rejects_oversized_stale_period() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            database_path: dir.path().join("c.db").to_string_lossy().into_owned(),
            stale_period_hours: 3_000_000_000_000_000,
            ..CacheConfig::default()
        };
        assert!(matches!(open_cache(&config), Err(StorageError::Config(_))));
    }
}
