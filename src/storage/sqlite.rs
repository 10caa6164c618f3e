//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the CacheStore trait.

use crate::storage::schema::{initialize_schema, recorded_migrations};
use crate::storage::traits::{CacheKind, CacheStatus, CacheStore, StorageError, StorageResult};
use crate::storage::{CachePolicy, CacheStatistics, CachedBody};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::warn;

/// SQLite cache backend
pub struct SqliteCache {
    conn: Connection,
    policy: CachePolicy,
}

impl SqliteCache {
    /// Opens (or creates) the cache database and runs pending migrations
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `policy` - Staleness policy applied on lookups
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteCache)` - Database is open and its schema is current
    /// * `Err(StorageError)` - Failed to open or migrate the database
    pub fn open(path: &Path, policy: CachePolicy) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn, policy })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory(policy: CachePolicy) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn, policy })
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Switches offline mode on or off for later lookups
    pub fn set_offline(&mut self, offline: bool) {
        self.policy.offline = offline;
    }

    fn is_stale(&self, key: &str, last_fetched: &str, now: DateTime<Utc>) -> bool {
        if self.policy.offline {
            return false;
        }
        match DateTime::parse_from_rfc3339(last_fetched) {
            Ok(fetched) => now.signed_duration_since(fetched.with_timezone(&Utc)) > self.policy.stale_period,
            Err(e) => {
                warn!("Unreadable fetch time for {}: {} ({})", key, last_fetched, e);
                true
            }
        }
    }
}

impl CacheStore for SqliteCache {
    fn check_stale(
        &self,
        kind: CacheKind,
        key: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<CacheStatus> {
        let sql = format!(
            "SELECT id, last_fetched FROM {} WHERE cache_key = ?1",
            kind.table_name()
        );
        let row: Option<(i64, String)> = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params![key], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        Ok(match row {
            None => CacheStatus::Missing,
            Some((id, last_fetched)) if self.is_stale(key, &last_fetched, now) => {
                CacheStatus::Stale(id)
            }
            Some((id, _)) => CacheStatus::Fresh(id),
        })
    }

    fn read(&self, kind: CacheKind, row_id: i64) -> StorageResult<CachedBody> {
        let body = match kind {
            CacheKind::Page => self
                .conn
                .prepare_cached("SELECT body FROM cached_pages WHERE id = ?1")?
                .query_row(params![row_id], |row| {
                    Ok(CachedBody {
                        body: row.get::<_, Option<Vec<u8>>>(0)?.unwrap_or_default(),
                        content_type: None,
                    })
                })
                .optional()?,
            CacheKind::Asset => self
                .conn
                .prepare_cached("SELECT body, content_type FROM cached_assets WHERE id = ?1")?
                .query_row(params![row_id], |row| {
                    Ok(CachedBody {
                        body: row.get::<_, Option<Vec<u8>>>(0)?.unwrap_or_default(),
                        content_type: row.get(1)?,
                    })
                })
                .optional()?,
        };

        body.ok_or(StorageError::EntryNotFound(row_id))
    }

    fn write(
        &mut self,
        kind: CacheKind,
        row_id: Option<i64>,
        key: &str,
        body: &[u8],
        content_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> StorageResult<i64> {
        let now = now.to_rfc3339();

        if let Some(id) = row_id {
            let updated = match kind {
                CacheKind::Page => self
                    .conn
                    .prepare_cached(
                        "UPDATE cached_pages SET last_fetched = ?1, body = ?2 WHERE id = ?3",
                    )?
                    .execute(params![now, body, id])?,
                CacheKind::Asset => self
                    .conn
                    .prepare_cached(
                        "UPDATE cached_assets SET last_fetched = ?1, body = ?2, content_type = ?3 WHERE id = ?4",
                    )?
                    .execute(params![now, body, content_type, id])?,
            };
            if updated == 1 {
                return Ok(id);
            }
            warn!("Cache row {} for {} vanished; inserting", id, key);
        }

        match kind {
            CacheKind::Page => {
                self.conn
                    .prepare_cached(
                        "INSERT INTO cached_pages (cache_key, last_fetched, body) VALUES (?1, ?2, ?3)
                         ON CONFLICT(cache_key) DO UPDATE SET last_fetched = excluded.last_fetched, body = excluded.body",
                    )?
                    .execute(params![key, now, body])?;
            }
            CacheKind::Asset => {
                self.conn
                    .prepare_cached(
                        "INSERT INTO cached_assets (cache_key, last_fetched, body, content_type) VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(cache_key) DO UPDATE SET last_fetched = excluded.last_fetched,
                         body = excluded.body, content_type = excluded.content_type",
                    )?
                    .execute(params![key, now, body, content_type])?;
            }
        }

        let sql = format!("SELECT id FROM {} WHERE cache_key = ?1", kind.table_name());
        let id = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params![key], |row| row.get(0))?;
        Ok(id)
    }

    fn pages_containing(&self, needle: &[u8]) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT cache_key, body FROM cached_pages ORDER BY id")?;
        let mut rows = stmt.query([])?;

        let mut found = Vec::new();
        while let Some(row) = rows.next()? {
            let body: Vec<u8> = row.get::<_, Option<Vec<u8>>>(1)?.unwrap_or_default();
            if contains_bytes(&body, needle) {
                found.push((row.get(0)?, body));
            }
        }
        Ok(found)
    }

    fn applied_migrations(&self) -> StorageResult<Vec<String>> {
        recorded_migrations(&self.conn)
    }

    fn statistics(&self) -> StorageResult<CacheStatistics> {
        let (page_count, page_bytes, oldest_page): (i64, i64, Option<String>) =
            self.conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(LENGTH(body)), 0), MIN(last_fetched) FROM cached_pages",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
        let (asset_count, asset_bytes): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(body)), 0) FROM cached_assets",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(CacheStatistics {
            page_count: page_count as u64,
            page_bytes: page_bytes as u64,
            asset_count: asset_count as u64,
            asset_bytes: asset_bytes as u64,
            oldest_page,
            migrations: recorded_migrations(&self.conn)?.len(),
        })
    }
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}
