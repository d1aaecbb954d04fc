//! The per-user sync state machine.
//!
//! One invocation drives every configured source in sequence: snapshot
//! listing first, then checkpointed history streaming for sources that keep
//! one, then the favorites listing. Batches flow through the matcher and the
//! upsert engine; the resume cursor is committed only after a batch's
//! upserts have all landed, so a crash or timeout never advances past data
//! that was not persisted.

use super::models::{PerSourceResult, SyncJob, SyncPhase, SyncStatus};
use super::notifier::{notify_best_effort, CompletionNotifier, CompletionSummary};
use crate::catalog::CatalogSearch;
use crate::config::SyncSettings;
use crate::library_store::LibraryStore;
use crate::matcher::TrackMatcher;
use crate::normalize::NormalizedTrack;
use crate::sources::{ListeningEvent, SourceAdapter};
use crate::upsert::{TrackObservation, UpsertEngine};
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Whether a source pass ran to its end or was interrupted by cancellation.
#[derive(Debug, PartialEq, Eq)]
enum SourcePass {
    Finished,
    Cancelled,
}

pub struct SyncOrchestrator {
    store: Arc<dyn LibraryStore>,
    matcher: TrackMatcher,
    upsert: UpsertEngine,
    sources: Vec<Arc<dyn SourceAdapter>>,
    notifier: Arc<dyn CompletionNotifier>,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn LibraryStore>,
        catalog: Arc<dyn CatalogSearch>,
        sources: Vec<Arc<dyn SourceAdapter>>,
        notifier: Arc<dyn CompletionNotifier>,
        settings: SyncSettings,
    ) -> Self {
        let matcher = TrackMatcher::new(catalog, settings.match_concurrency);
        let upsert = UpsertEngine::new(store.clone());
        Self {
            store,
            matcher,
            upsert,
            sources,
            notifier,
            settings,
        }
    }

    /// Run one invocation of the given job.
    ///
    /// Re-invoking a terminal job is a no-op that reports the prior state.
    /// On cancellation the job is left `InProgress` with its checkpoints
    /// persisted; a later invocation resumes instead of restarting. Store
    /// errors abort the invocation, leaving the job in its last-good
    /// persisted state for the external scheduler to retry.
    pub async fn run(&self, job_id: &str, cancel: &CancellationToken) -> Result<SyncJob> {
        let mut job = self
            .store
            .get_job(job_id)?
            .with_context(|| format!("Sync job {} not found", job_id))?;

        if job.status.is_terminal() {
            info!(
                "Sync job {} already {}, nothing to do",
                job.id,
                job.status.as_str()
            );
            return Ok(job);
        }

        info!("Starting sync job {} for user {}", job.id, job.user_id);
        job.status = SyncStatus::InProgress;
        self.persist(&mut job)?;

        // Normalized pairs already processed this run; history batches are
        // deduplicated against it.
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for source in &self.sources {
            if cancel.is_cancelled() {
                info!("Sync job {} cancelled, leaving in progress", job.id);
                self.persist(&mut job)?;
                return Ok(job);
            }

            job.progress.current_source = Some(source.name().to_string());
            job.progress.current_phase = None;

            let mut result = PerSourceResult::new(source.name());
            let pass = self
                .run_source(&mut job, source.as_ref(), &mut seen, &mut result, cancel)
                .await?;
            let cancelled = pass == SourcePass::Cancelled;

            job.results.push(result);
            self.persist(&mut job)?;

            if cancelled {
                info!("Sync job {} cancelled, leaving in progress", job.id);
                return Ok(job);
            }
        }

        let failures: Vec<String> = job
            .results
            .iter()
            .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {}", r.source, e)))
            .collect();

        job.progress.current_source = None;
        job.progress.current_phase = None;
        job.completed_at = Some(Utc::now());
        if failures.is_empty() {
            job.status = SyncStatus::Completed;
            job.error = None;
        } else {
            job.status = SyncStatus::Failed;
            job.error = Some(failures.join("; "));
        }
        self.persist(&mut job)?;
        info!(
            "Sync job {} finished with status {}",
            job.id,
            job.status.as_str()
        );

        let summary = self.build_summary(&job);
        notify_best_effort(self.notifier.as_ref(), &summary).await;

        Ok(job)
    }

    async fn run_source(
        &self,
        job: &mut SyncJob,
        source: &dyn SourceAdapter,
        seen: &mut HashSet<(String, String)>,
        result: &mut PerSourceResult,
        cancel: &CancellationToken,
    ) -> Result<SourcePass> {
        // a. Current snapshot, always fetched and processed in full. Not
        // deduplicated: rank/popularity must refresh even for pairs an
        // earlier source already produced this run.
        self.set_phase(job, SyncPhase::Fetching)?;
        match source.fetch_snapshot().await {
            Ok(events) => {
                self.process_events(job, events, seen, result, source.name(), false, false)
                    .await?;
            }
            Err(e) => {
                warn!("Snapshot fetch failed: {}", e);
                result.error = Some(e.to_string());
                return Ok(SourcePass::Finished);
            }
        }

        // b. Checkpointed history streaming.
        if source.supports_history() {
            let pass = self.run_history(job, source, seen, result, cancel).await?;
            if pass == SourcePass::Cancelled {
                return Ok(pass);
            }
            if result.error.is_some() {
                return Ok(SourcePass::Finished);
            }
        }

        // c. Favorites, cheap and re-fetched in full every run. Not
        // deduplicated: a favorite already processed this run still needs
        // its saved flag raised.
        self.set_phase(job, SyncPhase::Fetching)?;
        match source.fetch_favorites().await {
            Ok(events) => {
                self.process_events(job, events, seen, result, source.name(), true, false)
                    .await?;
            }
            Err(e) => {
                warn!("Favorites fetch failed: {}", e);
                result.error = Some(e.to_string());
            }
        }

        Ok(SourcePass::Finished)
    }

    /// Stream history pages strictly older than the committed cursor,
    /// batching them for match/upsert and committing the cursor after each
    /// batch.
    async fn run_history(
        &self,
        job: &mut SyncJob,
        source: &dyn SourceAdapter,
        seen: &mut HashSet<(String, String)>,
        result: &mut PerSourceResult,
        cancel: &CancellationToken,
    ) -> Result<SourcePass> {
        let user_id = job.user_id.clone();
        let mut cursor = self
            .store
            .get_cursor(&user_id, source.name())?
            .unwrap_or_default();

        if cursor.history_complete {
            debug!(
                "History already complete for {} ({} items), skipping",
                source.name(),
                cursor.items_processed_total
            );
            return Ok(SourcePass::Finished);
        }

        // Uncommitted lower bound for the next page fetch. Starts at the
        // committed cursor and tightens as pages arrive within a batch.
        let mut fetch_before = cursor.oldest_processed_timestamp;

        loop {
            // Cancellation is honored between batches only; a batch in
            // flight always runs to its checkpoint.
            if cancel.is_cancelled() {
                self.persist(job)?;
                return Ok(SourcePass::Cancelled);
            }

            let mut batch: Vec<ListeningEvent> = Vec::new();
            let mut exhausted = false;

            self.set_phase(job, SyncPhase::Fetching)?;
            while batch.len() < self.settings.batch_size && !exhausted {
                let page = match source
                    .fetch_history_page(fetch_before, self.settings.page_size)
                    .await
                {
                    Ok(page) => page,
                    Err(e) => {
                        warn!("History fetch failed: {}", e);
                        result.error = Some(e.to_string());
                        break;
                    }
                };

                if page.events.is_empty() {
                    exhausted = true;
                    break;
                }
                exhausted = page.complete;

                let batch_len_before = batch.len();
                let bound_before = fetch_before;
                for event in page.events {
                    // The fetch bound tightens past malformed events too, or
                    // a page of nothing but garbage would be refetched
                    // forever.
                    if let Some(ts) = event.played_at {
                        fetch_before = Some(match fetch_before {
                            Some(bound) => bound.min(ts),
                            None => ts,
                        });
                    }
                    if event.is_malformed() {
                        debug!("Skipping malformed history event from {}", source.name());
                        continue;
                    }
                    batch.push(event);
                }

                // A page that neither tightened the bound nor contributed an
                // event would be refetched verbatim; treat it as the end of
                // this source's history.
                if batch.len() == batch_len_before && fetch_before == bound_before {
                    warn!(
                        "History page from {} made no progress, stopping",
                        source.name()
                    );
                    exhausted = true;
                    break;
                }
            }

            if batch.is_empty() {
                if exhausted {
                    cursor.history_complete = true;
                    self.store.put_cursor(&user_id, source.name(), &cursor)?;
                    info!(
                        "History complete for {} after {} items",
                        source.name(),
                        cursor.items_processed_total
                    );
                }
                return Ok(SourcePass::Finished);
            }

            let batch_oldest = batch.iter().filter_map(|e| e.played_at).min();
            let processed = self
                .process_events(
                    job,
                    batch,
                    seen,
                    result,
                    source.name(),
                    false,
                    true,
                )
                .await?;

            // Checkpoint only now, after every upsert in the batch landed.
            match batch_oldest {
                Some(oldest) => cursor.advance(oldest, processed),
                None => cursor.items_processed_total += processed,
            }
            if exhausted {
                cursor.history_complete = true;
            }
            self.store.put_cursor(&user_id, source.name(), &cursor)?;

            if result.error.is_some() || exhausted {
                if cursor.history_complete {
                    info!(
                        "History complete for {} after {} items",
                        source.name(),
                        cursor.items_processed_total
                    );
                }
                return Ok(SourcePass::Finished);
            }
        }
    }

    /// Match and upsert a set of events, updating tallies and progress.
    /// Returns how many well-formed events were accounted for.
    #[allow(clippy::too_many_arguments)]
    async fn process_events(
        &self,
        job: &mut SyncJob,
        events: Vec<ListeningEvent>,
        seen: &mut HashSet<(String, String)>,
        result: &mut PerSourceResult,
        source_name: &str,
        mark_saved: bool,
        dedup: bool,
    ) -> Result<u64> {
        let events: Vec<ListeningEvent> =
            events.into_iter().filter(|e| !e.is_malformed()).collect();
        let count = events.len() as u64;
        if count == 0 {
            return Ok(0);
        }

        result.items_fetched += count;
        job.progress.total_items += count;

        // Within-run duplicate suppression keys on the normalized pair;
        // repeats of a pair already matched and upserted this run carry no
        // new information.
        let mut to_process: Vec<ListeningEvent> = Vec::new();
        for event in events {
            let normalized = NormalizedTrack::from_raw(&event.artist, &event.title);
            let pair = (normalized.artist, normalized.title);
            if seen.insert(pair) || !dedup {
                to_process.push(event);
            }
        }

        self.set_phase(job, SyncPhase::Matching)?;
        let tracks: Vec<(String, String)> = to_process
            .iter()
            .map(|e| (e.artist.clone(), e.title.clone()))
            .collect();
        let matched = self.matcher.batch_match(&tracks).await;

        let matched_count = matched
            .iter()
            .filter(|m| m.catalog_entry.is_some())
            .count() as u64;
        result.items_matched += matched_count;
        job.progress.matched_items += matched_count;

        self.set_phase(job, SyncPhase::Storing)?;
        let observations: Vec<TrackObservation> = matched
            .into_iter()
            .zip(&to_process)
            .map(|(matched, event)| TrackObservation {
                matched,
                play_signal: event.play_signal,
                rank: event.rank,
            })
            .collect();

        let outcome = self
            .upsert
            .upsert(&job.user_id, &observations, source_name, mark_saved)?;
        result.records_created += outcome.created;
        result.records_updated += outcome.updated;

        job.progress.processed_items += count;
        self.persist(job)?;

        Ok(count)
    }

    fn set_phase(&self, job: &mut SyncJob, phase: SyncPhase) -> Result<()> {
        job.progress.current_phase = Some(phase);
        self.persist(job)
    }

    fn persist(&self, job: &mut SyncJob) -> Result<()> {
        job.updated_at = Utc::now();
        self.store.put_job(job)
    }

    fn build_summary(&self, job: &SyncJob) -> CompletionSummary {
        let distinct_artists_stored = match self.store.count_distinct_artists(&job.user_id) {
            Ok(count) => count as u64,
            Err(e) => {
                warn!("Failed to count distinct artists for summary: {:#}", e);
                0
            }
        };
        CompletionSummary {
            user_id: job.user_id.clone(),
            items_matched_total: job.results.iter().map(|r| r.items_matched).sum(),
            distinct_artists_stored,
            source_names: job.results.iter().map(|r| r.source.clone()).collect(),
        }
    }
}
