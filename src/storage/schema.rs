//! Database schema definitions and migrations
//!
//! Migrations are append-only: the recorded log must always be a prefix of
//! [`MIGRATIONS`]. New schema changes go at the end of the list.

use crate::storage::traits::{StorageError, StorageResult};
use rusqlite::{params, Connection};
use tracing::{debug, info};

/// One schema step
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: &'static str,
    pub sql: &'static str,
}

/// Every migration, in application order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001-create-migrations",
        sql: r#"
CREATE TABLE migrations (
    version TEXT NOT NULL
);
"#,
    },
    Migration {
        version: "0002-cached-pages",
        sql: r#"
CREATE TABLE cached_pages (
    id INTEGER PRIMARY KEY ASC,
    cache_key TEXT UNIQUE NOT NULL,
    last_fetched TEXT NOT NULL,
    body BLOB
);
"#,
    },
    Migration {
        version: "0003-cached-assets",
        sql: r#"
CREATE TABLE cached_assets (
    id INTEGER PRIMARY KEY ASC,
    cache_key TEXT UNIQUE NOT NULL,
    last_fetched TEXT NOT NULL,
    content_type TEXT,
    body BLOB
);
"#,
    },
];

const INSERT_MIGRATION: &str = "INSERT INTO migrations (version) VALUES (?1)";

/// Returns true if the migrations table exists
fn migrations_table_exists(conn: &Connection) -> StorageResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'migrations'",
        [],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Reads the recorded migration log in insertion order
pub fn recorded_migrations(conn: &Connection) -> StorageResult<Vec<String>> {
    if !migrations_table_exists(conn)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare("SELECT version FROM migrations ORDER BY rowid")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(versions)
}

/// Initializes the database schema
///
/// Equivalent to [`apply_migrations`] with the built-in list.
pub fn initialize_schema(conn: &Connection) -> StorageResult<Vec<&'static str>> {
    apply_migrations(conn, MIGRATIONS)
}

/// Brings the database up to date with a migration list
///
/// The first entry must create the `migrations` table. When that table is
/// missing the database is new and the first entry is applied on its own
/// before the log is read. Each later step is applied, then recorded in its
/// own transaction.
///
/// # Returns
///
/// * `Ok(Vec<&str>)` - Versions applied by this call (empty when up to date)
/// * `Err(StorageError::MigrationMismatch)` - The log is not a prefix of the list
/// * `Err(StorageError::MigrationApply)` - A step failed; nothing was recorded for it
/// * `Err(StorageError::MigrationRecord)` - A step was applied but not recorded
pub fn apply_migrations(
    conn: &Connection,
    migrations: &[Migration],
) -> StorageResult<Vec<&'static str>> {
    let mut applied = Vec::new();

    if !migrations_table_exists(conn)? {
        if let Some(first) = migrations.first() {
            info!("Setting up cache database");
            apply_one(conn, first)?;
            applied.push(first.version);
        }
    }

    let recorded = recorded_migrations(conn)?;
    for (position, version) in recorded.iter().enumerate() {
        let expected = migrations.get(position).map(|m| m.version);
        if expected != Some(version.as_str()) {
            return Err(StorageError::MigrationMismatch {
                position,
                recorded: version.clone(),
                expected: expected.map(str::to_string),
            });
        }
    }

    for migration in &migrations[recorded.len().min(migrations.len())..] {
        apply_one(conn, migration)?;
        applied.push(migration.version);
    }

    if applied.is_empty() {
        debug!("Cache schema up to date ({} migrations)", recorded.len());
    }

    Ok(applied)
}

fn apply_one(conn: &Connection, migration: &Migration) -> StorageResult<()> {
    conn.execute_batch(migration.sql)
        .map_err(|source| StorageError::MigrationApply {
            version: migration.version.to_string(),
            source,
        })?;

    record(conn, migration.version).map_err(|source| StorageError::MigrationRecord {
        version: migration.version.to_string(),
        source,
    })?;

    info!("Applied migration {}", migration.version);
    Ok(())
}

fn record(conn: &Connection, version: &str) -> Result<(), rusqlite::Error> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(INSERT_MIGRATION, params![version])?;
    tx.commit()
}
