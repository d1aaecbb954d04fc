//! Persistent models for the per-user library.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a user's library, keyed by `(user_id, song_id)`.
///
/// `song_id` is the catalog id when the track matched, otherwise a
/// synthesized identity derived from the normalized fields. Records are
/// created on first observation and mutated on every subsequent observation
/// of the same identity; the pipeline never deletes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLibraryRecord {
    pub user_id: String,
    pub song_id: String,
    /// Which upstream service produced the first observation.
    pub source: String,
    /// Original (not normalized) artist string.
    pub artist: String,
    /// Original (not normalized) title string.
    pub title: String,
    pub has_catalog_match: bool,
    /// Service-reported play count, when the source provides one.
    pub play_signal: Option<i64>,
    /// Service-reported popularity rank, when the source provides one.
    pub rank: Option<i64>,
    /// Times this identity has been observed across syncs.
    pub sync_count: i64,
    pub saved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How far the historical fetch for one `(user, source)` pair has progressed.
///
/// Persisted after every committed batch so a later invocation resumes
/// strictly before the oldest previously-seen event instead of re-scanning
/// from the start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeCursor {
    /// Unix timestamp (seconds) of the oldest event processed so far.
    /// `None` until the first batch commits.
    pub oldest_processed_timestamp: Option<i64>,
    /// True once the source reported no more history.
    pub history_complete: bool,
    pub items_processed_total: u64,
}

impl ResumeCursor {
    /// Commit one processed batch: fold in its oldest timestamp and add its
    /// size to the running total. The timestamp boundary only ever moves
    /// older, never newer.
    pub fn advance(&mut self, batch_oldest: i64, batch_len: u64) {
        self.oldest_processed_timestamp = Some(match self.oldest_processed_timestamp {
            Some(current) => current.min(batch_oldest),
            None => batch_oldest,
        });
        self.items_processed_total += batch_len;
    }
}
