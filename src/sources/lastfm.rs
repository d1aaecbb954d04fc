//! Last.fm source adapter: the scrobble-history service.
//!
//! Rate limited to 5 requests per second per Last.fm API guidelines.

use super::{HistoryPage, ListeningEvent, SourceAdapter, SourceError, SourceErrorKind};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(200); // 5 req/sec
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const SOURCE_NAME: &str = "lastfm";

pub struct LastfmSource {
    client: Client,
    base_url: String,
    api_key: String,
    username: String,
    last_request: Mutex<Instant>,
}

#[derive(Deserialize)]
struct RecentTracksResponse {
    recenttracks: Option<RecentTracksContainer>,
}

#[derive(Deserialize)]
struct RecentTracksContainer {
    track: Option<Vec<RecentTrack>>,
    #[serde(rename = "@attr")]
    attr: Option<PageAttr>,
}

#[derive(Deserialize)]
struct PageAttr {
    page: Option<String>,
    #[serde(rename = "totalPages")]
    total_pages: Option<String>,
}

#[derive(Deserialize)]
struct RecentTrack {
    name: Option<String>,
    artist: Option<NameField>,
    date: Option<DateField>,
}

#[derive(Deserialize)]
struct NameField {
    #[serde(rename = "#text")]
    text: Option<String>,
}

#[derive(Deserialize)]
struct DateField {
    uts: Option<String>,
}

#[derive(Deserialize)]
struct TopTracksResponse {
    toptracks: Option<TopTracksContainer>,
}

#[derive(Deserialize)]
struct TopTracksContainer {
    track: Option<Vec<TopTrack>>,
}

#[derive(Deserialize)]
struct TopTrack {
    name: Option<String>,
    playcount: Option<String>,
    artist: Option<PlainNameField>,
    #[serde(rename = "@attr")]
    attr: Option<RankAttr>,
}

#[derive(Deserialize)]
struct PlainNameField {
    name: Option<String>,
}

#[derive(Deserialize)]
struct RankAttr {
    rank: Option<String>,
}

#[derive(Deserialize)]
struct LovedTracksResponse {
    lovedtracks: Option<LovedTracksContainer>,
}

#[derive(Deserialize)]
struct LovedTracksContainer {
    track: Option<Vec<LovedTrack>>,
}

#[derive(Deserialize)]
struct LovedTrack {
    name: Option<String>,
    artist: Option<PlainNameField>,
}

impl LastfmSource {
    pub fn new(api_key: &str, username: &str) -> Result<Self, SourceError> {
        Self::with_base_url(DEFAULT_API_BASE, api_key, username)
    }

    pub fn with_base_url(
        base_url: &str,
        api_key: &str,
        username: &str,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SourceError::from_reqwest(SOURCE_NAME, e))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            username: username.to_string(),
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

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, SourceError> {
        self.rate_limit().await;
        let response = self
            .client
            .get(url)
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

    fn method_url(&self, method: &str, extra: &str) -> String {
        format!(
            "{}?method={}&user={}&api_key={}&format=json{}",
            self.base_url,
            method,
            urlencoding::encode(&self.username),
            self.api_key,
            extra
        )
    }
}

#[async_trait::async_trait]
impl SourceAdapter for LastfmSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn supports_history(&self) -> bool {
        true
    }

    async fn fetch_snapshot(&self) -> Result<Vec<ListeningEvent>, SourceError> {
        let url = self.method_url("user.gettoptracks", "&limit=200");
        let body: TopTracksResponse = self.get_json(&url).await?;

        let tracks = body
            .toptracks
            .and_then(|c| c.track)
            .unwrap_or_default();
        Ok(tracks
            .into_iter()
            .map(|t| ListeningEvent {
                artist: t.artist.and_then(|a| a.name).unwrap_or_default(),
                title: t.name.unwrap_or_default(),
                played_at: None,
                play_signal: t.playcount.as_deref().and_then(|s| s.parse().ok()),
                rank: t
                    .attr
                    .and_then(|a| a.rank)
                    .and_then(|s| s.parse().ok()),
            })
            .collect())
    }

    async fn fetch_history_page(
        &self,
        before: Option<i64>,
        limit: usize,
    ) -> Result<HistoryPage, SourceError> {
        let mut extra = format!("&limit={}&extended=0", limit);
        if let Some(before) = before {
            extra.push_str(&format!("&to={}", before));
        }
        let url = self.method_url("user.getrecenttracks", &extra);
        let body: RecentTracksResponse = self.get_json(&url).await?;

        let container = body.recenttracks.ok_or_else(|| {
            SourceError::new(
                SourceErrorKind::Parse,
                SOURCE_NAME,
                "recenttracks missing from response",
            )
        })?;

        let last_page = container
            .attr
            .as_ref()
            .map(|attr| {
                let page: u64 = attr.page.as_deref().and_then(|s| s.parse().ok()).unwrap_or(1);
                let total: u64 = attr
                    .total_pages
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1);
                page >= total
            })
            .unwrap_or(true);

        let events: Vec<ListeningEvent> = container
            .track
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| {
                // Entries without a date are the "now playing" track; they
                // have no place on a historical timeline.
                let uts: i64 = t.date?.uts?.parse().ok()?;
                if let Some(before) = before {
                    // The upstream filter is inclusive; the contract here is
                    // strictly older.
                    if uts >= before {
                        return None;
                    }
                }
                Some(ListeningEvent {
                    artist: t.artist.and_then(|a| a.text).unwrap_or_default(),
                    title: t.name.unwrap_or_default(),
                    played_at: Some(uts),
                    play_signal: None,
                    rank: None,
                })
            })
            .collect();

        Ok(HistoryPage {
            complete: last_page || events.is_empty(),
            events,
        })
    }

    async fn fetch_favorites(&self) -> Result<Vec<ListeningEvent>, SourceError> {
        let url = self.method_url("user.getlovedtracks", "&limit=500");
        let body: LovedTracksResponse = self.get_json(&url).await?;

        let tracks = body
            .lovedtracks
            .and_then(|c| c.track)
            .unwrap_or_default();
        Ok(tracks
            .into_iter()
            .map(|t| ListeningEvent {
                artist: t.artist.and_then(|a| a.name).unwrap_or_default(),
                title: t.name.unwrap_or_default(),
                played_at: None,
                play_signal: None,
                rank: None,
            })
            .collect())
    }
}
