//! The produced interface: start syncs, poll their status.

use super::models::SyncJob;
use super::orchestrator::SyncOrchestrator;
use crate::library_store::LibraryStore;
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Entry point consumed by the triggering layer. Jobs run as spawned tasks;
/// progress is polled, not pushed.
pub struct SyncService {
    store: Arc<dyn LibraryStore>,
    orchestrator: Arc<SyncOrchestrator>,
    shutdown: CancellationToken,
}

impl SyncService {
    pub fn new(store: Arc<dyn LibraryStore>, orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            store,
            orchestrator,
            shutdown: CancellationToken::new(),
        }
    }

    /// Start (or resume) a sync for the user and return the job id.
    ///
    /// One active job per user: if the latest job is not terminal yet, its
    /// id is returned instead of creating a competing one.
    pub fn start_sync(&self, user_id: &str) -> Result<String> {
        if let Some(latest) = self.store.list_jobs(user_id, 1)?.into_iter().next() {
            if !latest.status.is_terminal() {
                return Ok(latest.id);
            }
        }

        let job = SyncJob::new(user_id);
        self.store.put_job(&job)?;
        self.spawn_run(job.id.clone());
        Ok(job.id)
    }

    /// Re-invoke an existing job, e.g. after a cancelled or crashed
    /// invocation. Terminal jobs are reported as-is without running.
    pub fn resume_sync(&self, job_id: &str) -> Result<()> {
        self.spawn_run(job_id.to_string());
        Ok(())
    }

    pub fn get_job_status(&self, job_id: &str) -> Result<Option<SyncJob>> {
        self.store.get_job(job_id)
    }

    pub fn get_latest_job(&self, user_id: &str) -> Result<Option<SyncJob>> {
        Ok(self.store.list_jobs(user_id, 1)?.into_iter().next())
    }

    /// Token cancelled on [`shutdown`](Self::shutdown); in-flight jobs stop
    /// at their next batch boundary and stay resumable.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn spawn_run(&self, job_id: String) {
        let orchestrator = self.orchestrator.clone();
        let cancel = self.shutdown.child_token();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run(&job_id, &cancel).await {
                error!("Sync job {} invocation failed: {:#}", job_id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, CatalogSearch};
    use crate::config::SyncSettings;
    use crate::library_store::MemoryLibraryStore;
    use crate::sync::notifier::LogNotifier;
    use crate::sync::SyncStatus;
    use std::collections::HashMap;

    struct EmptyCatalog;

    #[async_trait::async_trait]
    impl CatalogSearch for EmptyCatalog {
        async fn search(&self, _query: &str) -> Result<Vec<CatalogEntry>> {
            Ok(vec![])
        }

        async fn batch_lookup(
            &self,
            _pairs: &[(String, String)],
        ) -> Result<HashMap<(String, String), CatalogEntry>> {
            Ok(HashMap::new())
        }
    }

    fn service() -> (Arc<MemoryLibraryStore>, SyncService) {
        let store = Arc::new(MemoryLibraryStore::new());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone(),
            Arc::new(EmptyCatalog),
            vec![],
            Arc::new(LogNotifier),
            SyncSettings::default(),
        ));
        (store.clone(), SyncService::new(store, orchestrator))
    }

    #[tokio::test]
    async fn test_start_sync_creates_and_completes_job() {
        let (store, service) = service();
        let job_id = service.start_sync("user-1").unwrap();

        // No sources configured, so the spawned run completes immediately.
        let mut status = SyncStatus::Pending;
        for _ in 0..50 {
            if let Some(job) = store.get_job(&job_id).unwrap() {
                status = job.status;
                if status.is_terminal() {
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, SyncStatus::Completed);

        assert_eq!(
            service.get_latest_job("user-1").unwrap().unwrap().id,
            job_id
        );
        assert!(service.get_job_status("missing").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_start_sync_returns_active_job_instead_of_competing() {
        let (store, service) = service();
        // A job stuck in progress, e.g. a previous invocation that was
        // cancelled mid-way.
        let mut job = SyncJob::new("user-1");
        job.status = SyncStatus::InProgress;
        store.put_job(&job).unwrap();

        let returned = service.start_sync("user-1").unwrap();
        assert_eq!(returned, job.id);
    }

    #[tokio::test]
    async fn test_start_sync_after_terminal_job_creates_new_one() {
        let (store, service) = service();
        let mut job = SyncJob::new("user-1");
        job.status = SyncStatus::Failed;
        store.put_job(&job).unwrap();

        let returned = service.start_sync("user-1").unwrap();
        assert_ne!(returned, job.id);
    }
}
