use scrobble_sync::sources::{
    HistoryPage, ListeningEvent, SourceAdapter, SourceError, SourceErrorKind,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub fn snapshot_event(artist: &str, title: &str) -> ListeningEvent {
    ListeningEvent {
        artist: artist.to_string(),
        title: title.to_string(),
        played_at: None,
        play_signal: None,
        rank: None,
    }
}

pub fn historical_event(artist: &str, title: &str, played_at: i64) -> ListeningEvent {
    ListeningEvent {
        artist: artist.to_string(),
        title: title.to_string(),
        played_at: Some(played_at),
        play_signal: None,
        rank: None,
    }
}

/// Scripted source adapter serving fixed listings.
///
/// History events must be sorted newest-first; pages are produced behind the
/// caller's `before` bound exactly like a real scrobble service. Optional
/// failure injection and a cancellation hook let tests exercise mid-stream
/// interruption deterministically.
pub struct ScriptedSource {
    name: String,
    history_capable: bool,
    snapshot: Vec<ListeningEvent>,
    favorites: Vec<ListeningEvent>,
    history: Vec<ListeningEvent>,
    fail_snapshot: bool,
    /// Fail history fetch number N (1-based) with a network error.
    fail_history_fetch: Option<usize>,
    /// Cancel the token once N history fetches have been served.
    cancel_after_fetches: Option<(usize, CancellationToken)>,
    fetch_count: AtomicUsize,
    fetch_bounds: Mutex<Vec<Option<i64>>>,
}

impl ScriptedSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            history_capable: false,
            snapshot: vec![],
            favorites: vec![],
            history: vec![],
            fail_snapshot: false,
            fail_history_fetch: None,
            cancel_after_fetches: None,
            fetch_count: AtomicUsize::new(0),
            fetch_bounds: Mutex::new(vec![]),
        }
    }

    pub fn with_snapshot(mut self, events: Vec<ListeningEvent>) -> Self {
        self.snapshot = events;
        self
    }

    pub fn with_favorites(mut self, events: Vec<ListeningEvent>) -> Self {
        self.favorites = events;
        self
    }

    /// `events` newest-first.
    pub fn with_history(mut self, events: Vec<ListeningEvent>) -> Self {
        self.history_capable = true;
        self.history = events;
        self
    }

    pub fn failing_snapshot(mut self) -> Self {
        self.fail_snapshot = true;
        self
    }

    pub fn failing_history_fetch(mut self, nth: usize) -> Self {
        self.fail_history_fetch = Some(nth);
        self
    }

    pub fn cancelling_after_fetches(mut self, count: usize, token: CancellationToken) -> Self {
        self.cancel_after_fetches = Some((count, token));
        self
    }

    /// The `before` bounds of every history fetch served so far.
    pub fn fetch_bounds(&self) -> Vec<Option<i64>> {
        self.fetch_bounds.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SourceAdapter for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_history(&self) -> bool {
        self.history_capable
    }

    async fn fetch_snapshot(&self) -> Result<Vec<ListeningEvent>, SourceError> {
        if self.fail_snapshot {
            return Err(SourceError::new(
                SourceErrorKind::AuthExpired,
                &self.name,
                "token expired",
            ));
        }
        Ok(self.snapshot.clone())
    }

    async fn fetch_history_page(
        &self,
        before: Option<i64>,
        limit: usize,
    ) -> Result<HistoryPage, SourceError> {
        let fetch_number = self.fetch_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.fetch_bounds.lock().unwrap().push(before);

        if let Some(nth) = self.fail_history_fetch {
            if fetch_number == nth {
                return Err(SourceError::new(
                    SourceErrorKind::Network,
                    &self.name,
                    "connection reset",
                ));
            }
        }

        let older: Vec<ListeningEvent> = self
            .history
            .iter()
            .filter(|e| match (e.played_at, before) {
                (Some(ts), Some(bound)) => ts < bound,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .cloned()
            .collect();
        let events: Vec<ListeningEvent> = older.iter().take(limit).cloned().collect();

        if let Some((count, token)) = &self.cancel_after_fetches {
            if fetch_number >= *count {
                token.cancel();
            }
        }

        Ok(HistoryPage {
            complete: older.len() <= limit,
            events,
        })
    }

    async fn fetch_favorites(&self) -> Result<Vec<ListeningEvent>, SourceError> {
        Ok(self.favorites.clone())
    }
}
