//! Completion messaging boundary.

use anyhow::Result;
use tracing::{info, warn};

/// Aggregate totals handed to the notifier once per finished job.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSummary {
    pub user_id: String,
    pub items_matched_total: u64,
    pub distinct_artists_stored: u64,
    pub source_names: Vec<String>,
}

/// External completion messaging (push, email, whatever the deployment
/// wires in). Strictly fire-and-forget from the pipeline's point of view.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait::async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, summary: &CompletionSummary) -> Result<()>;
}

/// Invoke the notifier without letting its failure touch the job: the error
/// is logged and dropped.
pub async fn notify_best_effort(notifier: &dyn CompletionNotifier, summary: &CompletionSummary) {
    if let Err(e) = notifier.notify(summary).await {
        warn!(
            "Completion notification failed for user {}: {:#}",
            summary.user_id, e
        );
    }
}

/// Default notifier: just logs the summary.
pub struct LogNotifier;

#[async_trait::async_trait]
impl CompletionNotifier for LogNotifier {
    async fn notify(&self, summary: &CompletionSummary) -> Result<()> {
        info!(
            "Sync finished for user {}: {} matched items, {} distinct artists, sources: {}",
            summary.user_id,
            summary.items_matched_total,
            summary.distinct_artists_stored,
            summary.source_names.join(", ")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingNotifier {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CompletionNotifier for FailingNotifier {
        async fn notify(&self, _summary: &CompletionSummary) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("messaging backend down")
        }
    }

    fn summary() -> CompletionSummary {
        CompletionSummary {
            user_id: "user-1".to_string(),
            items_matched_total: 10,
            distinct_artists_stored: 4,
            source_names: vec!["spotify".to_string(), "lastfm".to_string()],
        }
    }

    #[tokio::test]
    async fn test_notifier_failure_is_swallowed() {
        let notifier = FailingNotifier {
            calls: AtomicUsize::new(0),
        };
        notify_best_effort(&notifier, &summary()).await;
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        assert!(LogNotifier.notify(&summary()).await.is_ok());
    }
}
