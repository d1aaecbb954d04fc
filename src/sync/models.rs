//! Job, progress and result models for the sync pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a sync job.
///
/// `Pending -> InProgress -> (Completed | Failed)`. A cancelled invocation
/// leaves the job in `InProgress` so a later invocation resumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Completed, // terminal
    Failed,    // terminal
}

impl SyncStatus {
    /// Returns true if this is a terminal state (Completed or Failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::InProgress => "IN_PROGRESS",
            SyncStatus::Completed => "COMPLETED",
            SyncStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(SyncStatus::Pending),
            "IN_PROGRESS" => Some(SyncStatus::InProgress),
            "COMPLETED" => Some(SyncStatus::Completed),
            "FAILED" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

/// Sub-phase within one source, reported for observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPhase {
    Fetching,
    Matching,
    Storing,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Fetching => "FETCHING",
            SyncPhase::Matching => "MATCHING",
            SyncPhase::Storing => "STORING",
        }
    }
}

/// Point-in-time progress snapshot, polled by callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Name of the source currently being processed, if any.
    pub current_source: Option<String>,
    pub current_phase: Option<SyncPhase>,
    /// Items known so far; grows as pages arrive for unbounded sources.
    pub total_items: u64,
    pub processed_items: u64,
    pub matched_items: u64,
}

impl SyncProgress {
    /// Returns the percentage of completion (0-100).
    pub fn percentage(&self) -> u8 {
        if self.total_items == 0 {
            return 0;
        }
        ((self.processed_items * 100) / self.total_items).min(100) as u8
    }
}

/// Outcome of one source adapter within a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerSourceResult {
    pub source: String,
    pub items_fetched: u64,
    pub items_matched: u64,
    pub records_created: u64,
    pub records_updated: u64,
    /// Set when the source failed; other sources still run.
    pub error: Option<String>,
}

impl PerSourceResult {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Default::default()
        }
    }
}

/// One sync invocation for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: String,
    pub user_id: String,
    pub status: SyncStatus,
    pub progress: SyncProgress,
    pub results: Vec<PerSourceResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            status: SyncStatus::Pending,
            progress: SyncProgress::default(),
            results: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}
