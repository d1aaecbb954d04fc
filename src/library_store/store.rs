use super::models::{ResumeCursor, UserLibraryRecord};
use super::schema::{BASE_DB_VERSION, LIBRARY_VERSIONED_SCHEMAS};
use super::LibraryStore;
use crate::sync::{SyncJob, SyncProgress, SyncStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// SQLite-backed [`LibraryStore`].
///
/// Single connection behind a mutex; the pipeline is single-writer per user
/// so there is no contention worth pooling for.
pub struct SqliteLibraryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLibraryStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open library database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        if is_new_db {
            info!("Creating new library database at {:?}", path);
            LIBRARY_VERSIONED_SCHEMAS.last().unwrap().create(&conn)?;
        } else {
            let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let db_version = raw_version - BASE_DB_VERSION;

            if db_version < 1 {
                anyhow::bail!(
                    "Library database version {} is invalid (expected >= 1)",
                    db_version
                );
            }

            let current_schema_version = LIBRARY_VERSIONED_SCHEMAS.last().unwrap().version;

            let version_index = LIBRARY_VERSIONED_SCHEMAS
                .iter()
                .position(|s| s.version == db_version)
                .with_context(|| format!("Unknown library database version {}", db_version))?;
            LIBRARY_VERSIONED_SCHEMAS[version_index]
                .validate(&conn)
                .with_context(|| {
                    format!(
                        "Library database schema validation failed for version {}",
                        db_version
                    )
                })?;

            if db_version < current_schema_version {
                info!(
                    "Migrating library database from version {} to {}",
                    db_version, current_schema_version
                );
                Self::migrate(&mut conn, db_version)?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate(conn: &mut Connection, from_version: i64) -> Result<()> {
        let tx = conn.transaction()?;
        let mut latest = from_version;
        for schema in LIBRARY_VERSIONED_SCHEMAS.iter() {
            if schema.version > from_version {
                if let Some(migration_fn) = schema.migration {
                    migration_fn(&tx).with_context(|| {
                        format!("Failed to run migration to version {}", schema.version)
                    })?;
                }
                latest = schema.version;
            }
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    /// A timestamp that does not parse back is data corruption; surface it
    /// instead of substituting a fresh one.
    fn parse_datetime(s: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<UserLibraryRecord> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(UserLibraryRecord {
            user_id: row.get("user_id")?,
            song_id: row.get("song_id")?,
            source: row.get("source")?,
            artist: row.get("artist")?,
            title: row.get("title")?,
            has_catalog_match: row.get::<_, i64>("has_catalog_match")? != 0,
            play_signal: row.get("play_signal")?,
            rank: row.get("rank")?,
            sync_count: row.get("sync_count")?,
            saved: row.get::<_, i64>("saved")? != 0,
            created_at: Self::parse_datetime(&created_at)?,
            updated_at: Self::parse_datetime(&updated_at)?,
        })
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<SyncJob> {
        let status_str: String = row.get("status")?;
        let status = SyncStatus::parse(&status_str).unwrap_or(SyncStatus::Failed);

        let progress_json: String = row.get("progress")?;
        let progress: SyncProgress = serde_json::from_str(&progress_json).unwrap_or_default();

        let results_json: String = row.get("results")?;
        let results = serde_json::from_str(&results_json).unwrap_or_default();

        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let completed_at: Option<String> = row.get("completed_at")?;

        Ok(SyncJob {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            status,
            progress,
            results,
            error: row.get("error")?,
            created_at: Self::parse_datetime(&created_at)?,
            updated_at: Self::parse_datetime(&updated_at)?,
            completed_at: completed_at
                .map(|s| Self::parse_datetime(&s))
                .transpose()?,
        })
    }

    fn row_to_cursor(row: &rusqlite::Row) -> rusqlite::Result<ResumeCursor> {
        Ok(ResumeCursor {
            oldest_processed_timestamp: row.get("oldest_processed_timestamp")?,
            history_complete: row.get::<_, i64>("history_complete")? != 0,
            items_processed_total: row.get::<_, i64>("items_processed_total")? as u64,
        })
    }
}

impl LibraryStore for SqliteLibraryStore {
    fn get_record(&self, user_id: &str, song_id: &str) -> Result<Option<UserLibraryRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT * FROM user_library_records WHERE user_id = ?1 AND song_id = ?2",
                params![user_id, song_id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn put_record(&self, record: &UserLibraryRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO user_library_records
             (user_id, song_id, source, artist, title, has_catalog_match,
              play_signal, rank, sync_count, saved, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.user_id,
                record.song_id,
                record.source,
                record.artist,
                record.title,
                record.has_catalog_match as i64,
                record.play_signal,
                record.rank,
                record.sync_count,
                record.saved as i64,
                Self::format_datetime(&record.created_at),
                Self::format_datetime(&record.updated_at),
            ],
        )?;
        Ok(())
    }

    fn count_records(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM user_library_records WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn count_distinct_artists(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT artist) FROM user_library_records WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn list_records(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UserLibraryRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM user_library_records WHERE user_id = ?1
             ORDER BY updated_at DESC, song_id LIMIT ?2 OFFSET ?3",
        )?;
        let records = stmt
            .query_map(
                params![user_id, limit as i64, offset as i64],
                Self::row_to_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn get_job(&self, job_id: &str) -> Result<Option<SyncJob>> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(
                "SELECT * FROM sync_jobs WHERE id = ?1",
                params![job_id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn put_job(&self, job: &SyncJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO sync_jobs
             (id, user_id, status, progress, results, error,
              created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                job.id,
                job.user_id,
                job.status.as_str(),
                serde_json::to_string(&job.progress)?,
                serde_json::to_string(&job.results)?,
                job.error,
                Self::format_datetime(&job.created_at),
                Self::format_datetime(&job.updated_at),
                job.completed_at.as_ref().map(Self::format_datetime),
            ],
        )?;
        Ok(())
    }

    fn list_jobs(&self, user_id: &str, limit: usize) -> Result<Vec<SyncJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM sync_jobs WHERE user_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let jobs = stmt
            .query_map(params![user_id, limit as i64], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn get_cursor(&self, user_id: &str, source: &str) -> Result<Option<ResumeCursor>> {
        let conn = self.conn.lock().unwrap();
        let cursor = conn
            .query_row(
                "SELECT * FROM resume_cursors WHERE user_id = ?1 AND source = ?2",
                params![user_id, source],
                Self::row_to_cursor,
            )
            .optional()?;
        Ok(cursor)
    }

    fn put_cursor(&self, user_id: &str, source: &str, cursor: &ResumeCursor) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO resume_cursors
             (user_id, source, oldest_processed_timestamp, history_complete,
              items_processed_total, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                source,
                cursor.oldest_processed_timestamp,
                cursor.history_complete as i64,
                cursor.items_processed_total as i64,
                Self::format_datetime(&Utc::now()),
            ],
        )?;
        Ok(())
    }
}
