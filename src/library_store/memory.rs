use super::models::{ResumeCursor, UserLibraryRecord};
use super::LibraryStore;
use crate::sync::SyncJob;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory [`LibraryStore`] for tests and dry runs. Nothing survives the
/// process.
#[derive(Default)]
pub struct MemoryLibraryStore {
    records: Mutex<HashMap<(String, String), UserLibraryRecord>>,
    jobs: Mutex<HashMap<String, SyncJob>>,
    cursors: Mutex<HashMap<(String, String), ResumeCursor>>,
}

impl MemoryLibraryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LibraryStore for MemoryLibraryStore {
    fn get_record(&self, user_id: &str, song_id: &str) -> Result<Option<UserLibraryRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&(user_id.to_string(), song_id.to_string()))
            .cloned())
    }

    fn put_record(&self, record: &UserLibraryRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        records.insert(
            (record.user_id.clone(), record.song_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    fn count_records(&self, user_id: &str) -> Result<usize> {
        let records = self.records.lock().unwrap();
        Ok(records.keys().filter(|(uid, _)| uid == user_id).count())
    }

    fn count_distinct_artists(&self, user_id: &str) -> Result<usize> {
        let records = self.records.lock().unwrap();
        let artists: std::collections::HashSet<&str> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.artist.as_str())
            .collect();
        Ok(artists.len())
    }

    fn list_records(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UserLibraryRecord>> {
        let records = self.records.lock().unwrap();
        let mut matching: Vec<UserLibraryRecord> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.song_id.cmp(&b.song_id))
        });
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    fn get_job(&self, job_id: &str) -> Result<Option<SyncJob>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.get(job_id).cloned())
    }

    fn put_job(&self, job: &SyncJob) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn list_jobs(&self, user_id: &str, limit: usize) -> Result<Vec<SyncJob>> {
        let jobs = self.jobs.lock().unwrap();
        let mut matching: Vec<SyncJob> = jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    fn get_cursor(&self, user_id: &str, source: &str) -> Result<Option<ResumeCursor>> {
        let cursors = self.cursors.lock().unwrap();
        Ok(cursors
            .get(&(user_id.to_string(), source.to_string()))
            .cloned())
    }

    fn put_cursor(&self, user_id: &str, source: &str, cursor: &ResumeCursor) -> Result<()> {
        let mut cursors = self.cursors.lock().unwrap();
        cursors.insert(
            (user_id.to_string(), source.to_string()),
            cursor.clone(),
        );
        Ok(())
    }
}
