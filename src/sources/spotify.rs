//! Spotify source adapter: a bounded-catalog service.
//!
//! Spotify exposes no unbounded listening history, only current snapshots
//! (top tracks) and the saved-tracks library, so this adapter never serves
//! history pages.

use super::{HistoryPage, ListeningEvent, SourceAdapter, SourceError};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(100);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const SOURCE_NAME: &str = "spotify";

pub struct SpotifySource {
    client: Client,
    base_url: String,
    access_token: String,
    last_request: Mutex<Instant>,
}

#[derive(Deserialize)]
struct TopTracksResponse {
    items: Option<Vec<SpotifyTrack>>,
}

#[derive(Deserialize)]
struct SavedTracksResponse {
    items: Option<Vec<SavedTrackItem>>,
}

#[derive(Deserialize)]
struct SavedTrackItem {
    track: Option<SpotifyTrack>,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    name: Option<String>,
    artists: Option<Vec<SpotifyArtist>>,
    popularity: Option<i64>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    name: Option<String>,
}

impl SpotifySource {
    pub fn new(access_token: &str) -> Result<Self, SourceError> {
        Self::with_base_url(DEFAULT_API_BASE, access_token)
    }

    pub fn with_base_url(base_url: &str, access_token: &str) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SourceError::from_reqwest(SOURCE_NAME, e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            last_request: Mutex::new(Instant::now() - RATE_LIMIT_INTERVAL),
        })
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        if elapsed < RATE_LIMIT_INTERVAL {
            tokio::time::sleep(RATE_LIMIT_INTERVAL - elapsed).await;
        }
        *last = Instant::now();
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        self.rate_limit().await;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(SOURCE_NAME, e))?;
        if !response.status().is_success() {
            return Err(SourceError::from_status(SOURCE_NAME, response.status()));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::from_reqwest(SOURCE_NAME, e))
    }
}

fn track_to_event(track: SpotifyTrack, rank: Option<i64>) -> ListeningEvent {
    let artist = track
        .artists
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|a| a.name)
        .unwrap_or_default();
    ListeningEvent {
        artist,
        title: track.name.unwrap_or_default(),
        played_at: None,
        play_signal: track.popularity,
        rank,
    }
}

#[async_trait::async_trait]
impl SourceAdapter for SpotifySource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn supports_history(&self) -> bool {
        false
    }

    async fn fetch_snapshot(&self) -> Result<Vec<ListeningEvent>, SourceError> {
        let url = format!("{}/me/top/tracks?limit=50&time_range=long_term", self.base_url);
        let body: TopTracksResponse = self.get_json(&url).await?;

        Ok(body
            .items
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, track)| track_to_event(track, Some(index as i64 + 1)))
            .collect())
    }

    async fn fetch_history_page(
        &self,
        _before: Option<i64>,
        _limit: usize,
    ) -> Result<HistoryPage, SourceError> {
        Ok(HistoryPage {
            events: vec![],
            complete: true,
        })
    }

    async fn fetch_favorites(&self) -> Result<Vec<ListeningEvent>, SourceError> {
        let url = format!("{}/me/tracks?limit=50", self.base_url);
        let body: SavedTracksResponse = self.get_json(&url).await?;

        Ok(body
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| item.track)
            .map(|track| track_to_event(track, None))
            .collect())
    }
}
