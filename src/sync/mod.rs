mod models;
mod notifier;
mod orchestrator;
mod service;

pub use models::{PerSourceResult, SyncJob, SyncPhase, SyncProgress, SyncStatus};
pub use notifier::{notify_best_effort, CompletionNotifier, CompletionSummary, LogNotifier};
pub use orchestrator::SyncOrchestrator;
pub use service::SyncService;

#[cfg(feature = "mock")]
pub use notifier::MockCompletionNotifier;
