//! Versioned SQLite schema for the library database.
//!
//! The schema version is stored in `PRAGMA user_version`, offset by
//! [`BASE_DB_VERSION`] so a plain SQLite file (user_version 0) is never
//! mistaken for a valid version-0 library database.

use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Offset added to the schema version before writing `PRAGMA user_version`.
pub const BASE_DB_VERSION: i64 = 41000;

type MigrationFn = fn(&Connection) -> Result<()>;

/// One schema version: the statements that create it from scratch, the
/// tables it must contain, and the migration that upgrades the previous
/// version to it.
pub struct VersionedSchema {
    pub version: i64,
    pub create_statements: &'static [&'static str],
    pub expected_tables: &'static [&'static str],
    pub migration: Option<MigrationFn>,
}

impl VersionedSchema {
    /// Create this version's schema on a fresh database and stamp the
    /// user_version pragma.
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for statement in self.create_statements {
            conn.execute(statement, [])
                .with_context(|| format!("Failed to execute: {}", statement))?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    /// Check that every table this version defines actually exists.
    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.expected_tables {
            let found: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )?;
            if found == 0 {
                bail!("Missing table '{}' for schema version {}", table, self.version);
            }
        }
        Ok(())
    }
}

// =============================================================================
// Version 1 - library records, sync jobs, resume cursors
// =============================================================================

const CREATE_V1: &[&str] = &[
    "CREATE TABLE user_library_records (
        user_id TEXT NOT NULL,
        song_id TEXT NOT NULL,
        source TEXT NOT NULL,
        artist TEXT NOT NULL,
        title TEXT NOT NULL,
        has_catalog_match INTEGER NOT NULL,
        play_signal INTEGER,
        rank INTEGER,
        sync_count INTEGER NOT NULL,
        saved INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (user_id, song_id)
    )",
    "CREATE INDEX idx_library_records_user_updated
        ON user_library_records(user_id, updated_at DESC)",
    "CREATE TABLE sync_jobs (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        status TEXT NOT NULL,
        progress TEXT NOT NULL,
        results TEXT NOT NULL,
        error TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT
    )",
    "CREATE INDEX idx_sync_jobs_user_created
        ON sync_jobs(user_id, created_at DESC)",
    "CREATE TABLE resume_cursors (
        user_id TEXT NOT NULL,
        source TEXT NOT NULL,
        oldest_processed_timestamp INTEGER,
        history_complete INTEGER NOT NULL,
        items_processed_total INTEGER NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (user_id, source)
    )",
];

const SCHEMA_V1: VersionedSchema = VersionedSchema {
    version: 1,
    create_statements: CREATE_V1,
    expected_tables: &["user_library_records", "sync_jobs", "resume_cursors"],
    migration: None,
};

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[SCHEMA_V1];
