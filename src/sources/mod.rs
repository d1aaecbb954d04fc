//! Upstream music-service adapters.
//!
//! Each service is wrapped in a [`SourceAdapter`] exposing the same three
//! fetch shapes: a bounded current snapshot, paged history behind an
//! upper-bound timestamp filter (for services that keep history), and a
//! small favorites listing.

mod lastfm;
mod spotify;

pub use lastfm::LastfmSource;
pub use spotify::SpotifySource;

use serde::{Deserialize, Serialize};

/// One listening event as reported by an upstream service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListeningEvent {
    pub artist: String,
    pub title: String,
    /// Unix timestamp (seconds) of the listen, when the service reports one.
    pub played_at: Option<i64>,
    /// Service-reported play count.
    pub play_signal: Option<i64>,
    /// Service-reported popularity rank (1-based).
    pub rank: Option<i64>,
}

impl ListeningEvent {
    /// Events carrying neither artist nor title are contract violations from
    /// upstream; they are skipped and counted as neither fetched nor matched.
    pub fn is_malformed(&self) -> bool {
        self.artist.trim().is_empty() && self.title.trim().is_empty()
    }
}

/// One page of historical events.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub events: Vec<ListeningEvent>,
    /// True when no older history remains past this page.
    pub complete: bool,
}

/// Classification of upstream failures.
///
/// Retries are the external scheduler's job, not this core's; the
/// classification tells it which failures are worth re-invoking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    AuthExpired,
    RateLimited,
    Network,
    Timeout,
    Parse,
    Unexpected,
}

impl SourceErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceErrorKind::RateLimited | SourceErrorKind::Network | SourceErrorKind::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceErrorKind::AuthExpired => "auth_expired",
            SourceErrorKind::RateLimited => "rate_limited",
            SourceErrorKind::Network => "network",
            SourceErrorKind::Timeout => "timeout",
            SourceErrorKind::Parse => "parse",
            SourceErrorKind::Unexpected => "unexpected",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{source_name} source failed ({}): {message}", kind.as_str())]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub source_name: String,
    pub message: String,
}

impl SourceError {
    pub fn new(kind: SourceErrorKind, source_name: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    /// Classify a transport-level failure.
    pub fn from_reqwest(source_name: &str, error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            SourceErrorKind::Timeout
        } else if error.is_connect() {
            SourceErrorKind::Network
        } else if error.is_decode() {
            SourceErrorKind::Parse
        } else {
            SourceErrorKind::Unexpected
        };
        Self::new(kind, source_name, error.to_string())
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(source_name: &str, status: reqwest::StatusCode) -> Self {
        let kind = match status.as_u16() {
            401 | 403 => SourceErrorKind::AuthExpired,
            429 => SourceErrorKind::RateLimited,
            _ => SourceErrorKind::Unexpected,
        };
        Self::new(kind, source_name, format!("HTTP status {}", status))
    }
}

/// Uniform fetch surface over one upstream service.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether [`fetch_history_page`](Self::fetch_history_page) can go
    /// arbitrarily far back. Bounded services return false and only serve
    /// snapshots.
    fn supports_history(&self) -> bool;

    /// The bounded "current top/snapshot" listing, fetched in full.
    async fn fetch_snapshot(&self) -> Result<Vec<ListeningEvent>, SourceError>;

    /// One page of events strictly older than `before` (unix seconds);
    /// `None` starts from the newest.
    async fn fetch_history_page(
        &self,
        before: Option<i64>,
        limit: usize,
    ) -> Result<HistoryPage, SourceError>;

    /// The small favorites listing, fetched in full on every run.
    async fn fetch_favorites(&self) -> Result<Vec<ListeningEvent>, SourceError>;
}
