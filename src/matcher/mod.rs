//! Exact-then-fuzzy track matching against the catalog.

use crate::catalog::{CatalogEntry, CatalogSearch};
use crate::normalize::NormalizedTrack;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::warn;

/// One input track with its catalog resolution.
///
/// Constructed per input by the matcher and consumed immediately by the
/// upsert engine; never persisted itself.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedTrack {
    pub original_artist: String,
    pub original_title: String,
    pub normalized_artist: String,
    pub normalized_title: String,
    pub catalog_entry: Option<CatalogEntry>,
    /// 1.0 exact, 0.9 title-exact with artist-substring, 0.0 no match.
    pub confidence: f64,
}

impl MatchedTrack {
    fn no_match(artist: &str, title: &str, normalized: NormalizedTrack) -> Self {
        Self {
            original_artist: artist.to_string(),
            original_title: title.to_string(),
            normalized_artist: normalized.artist,
            normalized_title: normalized.title,
            catalog_entry: None,
            confidence: 0.0,
        }
    }
}

pub struct TrackMatcher {
    catalog: Arc<dyn CatalogSearch>,
    /// Upper bound on concurrent catalog searches within one batch.
    concurrency: usize,
}

impl TrackMatcher {
    pub fn new(catalog: Arc<dyn CatalogSearch>, concurrency: usize) -> Self {
        Self {
            catalog,
            concurrency: concurrency.max(1),
        }
    }

    /// Match one raw (artist, title) pair.
    ///
    /// Candidates are scanned in the catalog's ranked order. The first
    /// candidate whose normalized artist and title both match exactly wins
    /// with confidence 1.0 and ends the scan. Failing that, the first
    /// candidate with an exact title and an artist that contains, or is
    /// contained in, the input's artist scores 0.9. Anything else is an
    /// explicit no-match at 0.0.
    ///
    /// Catalog failures degrade to a no-match instead of failing the batch;
    /// partial matching beats losing the whole sync.
    pub async fn match_track(&self, artist: &str, title: &str) -> MatchedTrack {
        let normalized = NormalizedTrack::from_raw(artist, title);

        let query = format!("{} {}", normalized.artist, normalized.title);
        let candidates = match self.catalog.search(query.trim()).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Catalog search failed for {:?}: {:#}", query, e);
                return MatchedTrack::no_match(artist, title, normalized);
            }
        };

        let mut partial: Option<CatalogEntry> = None;
        for candidate in candidates {
            let candidate_track = NormalizedTrack::from_raw(&candidate.artist, &candidate.title);
            if candidate_track == normalized {
                return MatchedTrack {
                    original_artist: artist.to_string(),
                    original_title: title.to_string(),
                    normalized_artist: normalized.artist,
                    normalized_title: normalized.title,
                    catalog_entry: Some(candidate),
                    confidence: 1.0,
                };
            }
            if partial.is_none()
                && candidate_track.title == normalized.title
                && artist_overlaps(&candidate_track.artist, &normalized.artist)
            {
                partial = Some(candidate);
            }
        }

        match partial {
            Some(entry) => MatchedTrack {
                original_artist: artist.to_string(),
                original_title: title.to_string(),
                normalized_artist: normalized.artist,
                normalized_title: normalized.title,
                catalog_entry: Some(entry),
                confidence: 0.9,
            },
            None => MatchedTrack::no_match(artist, title, normalized),
        }
    }

    /// Match a batch of raw pairs, preserving input order.
    ///
    /// A single `batch_lookup` resolves the exact hits up front; only the
    /// misses fall back to individual ranked searches, bounded by the
    /// configured concurrency. Batching changes throughput, never semantics.
    pub async fn batch_match(&self, tracks: &[(String, String)]) -> Vec<MatchedTrack> {
        let normalized_pairs: Vec<(String, String)> = tracks
            .iter()
            .map(|(artist, title)| {
                let n = NormalizedTrack::from_raw(artist, title);
                (n.artist, n.title)
            })
            .collect();

        let exact_hits = match self.catalog.batch_lookup(&normalized_pairs).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Catalog batch lookup failed, falling back to search: {:#}", e);
                Default::default()
            }
        };

        let futures: Vec<_> = tracks
            .iter()
            .zip(normalized_pairs)
            .map(|((artist, title), pair)| {
                let exact = exact_hits.get(&pair).cloned();
                async move {
                    match exact {
                        Some(entry) => MatchedTrack {
                            original_artist: artist.clone(),
                            original_title: title.clone(),
                            normalized_artist: pair.0,
                            normalized_title: pair.1,
                            catalog_entry: Some(entry),
                            confidence: 1.0,
                        },
                        None => self.match_track(artist, title).await,
                    }
                }
            })
            .collect();

        stream::iter(futures)
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

/// Substring containment in either direction, with empty strings excluded so
/// an artistless input cannot 0.9-match every candidate with the same title.
fn artist_overlaps(candidate: &str, input: &str) -> bool {
    if candidate.is_empty() || input.is_empty() {
        return false;
    }
    candidate.contains(input) || input.contains(candidate)
}
