use super::models::{ResumeCursor, UserLibraryRecord};
use crate::sync::SyncJob;
use anyhow::Result;

/// Persistence boundary for the sync pipeline.
///
/// Point reads/writes are strongly consistent; list queries may lag behind.
/// Records are keyed `(user_id, song_id)`, cursors `(user_id, source)`, jobs
/// by their generated id.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait LibraryStore: Send + Sync {
    fn get_record(&self, user_id: &str, song_id: &str) -> Result<Option<UserLibraryRecord>>;
    /// Insert or fully replace the record with the same `(user_id, song_id)`.
    fn put_record(&self, record: &UserLibraryRecord) -> Result<()>;
    fn count_records(&self, user_id: &str) -> Result<usize>;
    fn count_distinct_artists(&self, user_id: &str) -> Result<usize>;
    /// Most recently updated first.
    fn list_records(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UserLibraryRecord>>;

    fn get_job(&self, job_id: &str) -> Result<Option<SyncJob>>;
    fn put_job(&self, job: &SyncJob) -> Result<()>;
    /// Most recently created first.
    fn list_jobs(&self, user_id: &str, limit: usize) -> Result<Vec<SyncJob>>;

    fn get_cursor(&self, user_id: &str, source: &str) -> Result<Option<ResumeCursor>>;
    fn put_cursor(&self, user_id: &str, source: &str, cursor: &ResumeCursor) -> Result<()>;
}
