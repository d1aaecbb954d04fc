//! Idempotent merge of matched tracks into per-user library records.

use crate::library_store::{LibraryStore, UserLibraryRecord};
use crate::matcher::MatchedTrack;
use anyhow::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// One matched track together with the signals its listening event carried.
#[derive(Debug, Clone)]
pub struct TrackObservation {
    pub matched: MatchedTrack,
    /// Service-reported play count, when available.
    pub play_signal: Option<i64>,
    /// Service-reported popularity rank, when available.
    pub rank: Option<i64>,
}

impl TrackObservation {
    pub fn new(matched: MatchedTrack) -> Self {
        Self {
            matched,
            play_signal: None,
            rank: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub created: u64,
    pub updated: u64,
}

/// Creates or updates [`UserLibraryRecord`]s, one per `(user, song-identity)`.
///
/// Assumes single-writer-per-user: the triggering layer never runs two syncs
/// for the same user at once, so read-modify-write here needs no locking.
pub struct UpsertEngine {
    store: Arc<dyn LibraryStore>,
}

impl UpsertEngine {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }

    /// Merge a batch of observations for one user.
    ///
    /// Unmatched tracks are persisted too, under a synthesized identity, so
    /// the library remembers what has no catalog version yet. Safe to invoke
    /// twice with the same input: the second pass updates instead of
    /// duplicating, and only `sync_count` (observation count) grows.
    ///
    /// `mark_saved` is set by the favorites/library listing pass; it flips
    /// `saved` on and never off.
    ///
    /// Store errors are fatal to the invocation; without a persisted write
    /// the in-memory progress cannot be trusted.
    pub fn upsert(
        &self,
        user_id: &str,
        observations: &[TrackObservation],
        source: &str,
        mark_saved: bool,
    ) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();
        let now = Utc::now();

        for observation in observations {
            let matched = &observation.matched;
            let song_id = match &matched.catalog_entry {
                Some(entry) => entry.id.clone(),
                None => synthesized_song_id(
                    source,
                    &matched.normalized_artist,
                    &matched.normalized_title,
                ),
            };

            match self.store.get_record(user_id, &song_id)? {
                Some(mut record) => {
                    record.sync_count += 1;
                    if observation.play_signal.is_some() {
                        record.play_signal = observation.play_signal;
                    }
                    if observation.rank.is_some() {
                        record.rank = observation.rank;
                    }
                    record.saved |= mark_saved;
                    record.updated_at = now;
                    self.store.put_record(&record)?;
                    outcome.updated += 1;
                }
                None => {
                    let record = UserLibraryRecord {
                        user_id: user_id.to_string(),
                        song_id,
                        source: source.to_string(),
                        artist: matched.original_artist.clone(),
                        title: matched.original_title.clone(),
                        has_catalog_match: matched.catalog_entry.is_some(),
                        play_signal: observation.play_signal,
                        rank: observation.rank,
                        sync_count: 1,
                        saved: mark_saved,
                        created_at: now,
                        updated_at: now,
                    };
                    self.store.put_record(&record)?;
                    outcome.created += 1;
                }
            }
        }

        Ok(outcome)
    }
}

/// Identity for tracks the catalog does not know: a digest of the source and
/// the normalized pair. Normalization is the correctness-bearing step, so the
/// already-normalized fields are what gets hashed.
pub fn synthesized_song_id(source: &str, normalized_artist: &str, normalized_title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0x1f]);
    hasher.update(normalized_artist.as_bytes());
    hasher.update([0x1f]);
    hasher.update(normalized_title.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest[..16].iter().map(|b| format!("{:02x}", b)).collect();
    format!("local:{}", hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::library_store::MemoryLibraryStore;

    fn matched(artist: &str, title: &str, entry: Option<CatalogEntry>) -> MatchedTrack {
        let confidence = if entry.is_some() { 1.0 } else { 0.0 };
        MatchedTrack {
            original_artist: artist.to_string(),
            original_title: title.to_string(),
            normalized_artist: artist.to_lowercase(),
            normalized_title: title.to_lowercase(),
            catalog_entry: entry,
            confidence,
        }
    }

    fn catalog_entry(id: &str) -> CatalogEntry {
        CatalogEntry {
            id: id.to_string(),
            artist: "Queen".to_string(),
            title: "Bohemian Rhapsody".to_string(),
            popularity: Some(90),
        }
    }

    fn engine() -> (Arc<MemoryLibraryStore>, UpsertEngine) {
        let store = Arc::new(MemoryLibraryStore::new());
        let engine = UpsertEngine::new(store.clone());
        (store, engine)
    }

    #[test]
    fn test_upsert_is_idempotent_on_identity() {
        let (store, engine) = engine();
        let observation = TrackObservation::new(matched(
            "Queen",
            "Bohemian Rhapsody",
            Some(catalog_entry("cat-1")),
        ));

        let first = engine
            .upsert("user-1", std::slice::from_ref(&observation), "lastfm", false)
            .unwrap();
        assert_eq!(first, UpsertOutcome { created: 1, updated: 0 });

        let second = engine
            .upsert("user-1", &[observation], "lastfm", false)
            .unwrap();
        assert_eq!(second, UpsertOutcome { created: 0, updated: 1 });

        assert_eq!(store.count_records("user-1").unwrap(), 1);
        let record = store.get_record("user-1", "cat-1").unwrap().unwrap();
        assert_eq!(record.sync_count, 2);
        assert!(record.has_catalog_match);
        assert_eq!(record.artist, "Queen");
    }

    #[test]
    fn test_unmatched_track_is_still_persisted() {
        let (store, engine) = engine();
        let observation =
            TrackObservation::new(matched("Obscure Band", "Unknown Song", None));

        engine.upsert("user-1", &[observation], "spotify", false).unwrap();

        assert_eq!(store.count_records("user-1").unwrap(), 1);
        let records = store.list_records("user-1", 10, 0).unwrap();
        assert!(!records[0].has_catalog_match);
        assert!(records[0].song_id.starts_with("local:"));
    }

    #[test]
    fn test_synthesized_identity_is_stable_and_distinct() {
        let a = synthesized_song_id("spotify", "obscure band", "unknown song");
        assert_eq!(a, synthesized_song_id("spotify", "obscure band", "unknown song"));
        assert_ne!(a, synthesized_song_id("lastfm", "obscure band", "unknown song"));
        assert_ne!(a, synthesized_song_id("spotify", "obscure band", "other song"));
        // Field boundaries matter: shifting a word across the separator
        // changes the identity.
        assert_ne!(
            synthesized_song_id("s", "a b", "c"),
            synthesized_song_id("s", "a", "b c")
        );
    }

    #[test]
    fn test_signals_refresh_but_absent_signals_do_not_clobber() {
        let (store, engine) = engine();
        let base = matched("Queen", "Bohemian Rhapsody", Some(catalog_entry("cat-1")));

        let mut with_signals = TrackObservation::new(base.clone());
        with_signals.play_signal = Some(42);
        with_signals.rank = Some(3);
        engine.upsert("user-1", &[with_signals], "spotify", false).unwrap();

        // Second observation without signals keeps the stored ones.
        engine
            .upsert("user-1", &[TrackObservation::new(base.clone())], "spotify", false)
            .unwrap();
        let record = store.get_record("user-1", "cat-1").unwrap().unwrap();
        assert_eq!(record.play_signal, Some(42));
        assert_eq!(record.rank, Some(3));

        // A newer signal overwrites.
        let mut newer = TrackObservation::new(base);
        newer.play_signal = Some(50);
        engine.upsert("user-1", &[newer], "spotify", false).unwrap();
        let record = store.get_record("user-1", "cat-1").unwrap().unwrap();
        assert_eq!(record.play_signal, Some(50));
        assert_eq!(record.rank, Some(3));
        assert_eq!(record.sync_count, 3);
    }

    #[test]
    fn test_mark_saved_flips_on_and_stays_on() {
        let (store, engine) = engine();
        let base = matched("Queen", "Bohemian Rhapsody", Some(catalog_entry("cat-1")));

        engine
            .upsert("user-1", &[TrackObservation::new(base.clone())], "spotify", false)
            .unwrap();
        assert!(!store.get_record("user-1", "cat-1").unwrap().unwrap().saved);

        engine
            .upsert("user-1", &[TrackObservation::new(base.clone())], "spotify", true)
            .unwrap();
        assert!(store.get_record("user-1", "cat-1").unwrap().unwrap().saved);

        // A later plain observation does not flip it back.
        engine
            .upsert("user-1", &[TrackObservation::new(base)], "spotify", false)
            .unwrap();
        assert!(store.get_record("user-1", "cat-1").unwrap().unwrap().saved);
    }

    #[test]
    fn test_created_records_marked_saved_from_library_listing() {
        let (store, engine) = engine();
        let observation = TrackObservation::new(matched(
            "Queen",
            "Bohemian Rhapsody",
            Some(catalog_entry("cat-1")),
        ));

        engine.upsert("user-1", &[observation], "spotify", true).unwrap();
        assert!(store.get_record("user-1", "cat-1").unwrap().unwrap().saved);
    }

    #[test]
    fn test_batch_counts_split_created_and_updated() {
        let (_store, engine) = engine();
        let a = TrackObservation::new(matched("A", "One", Some(catalog_entry("cat-a"))));
        let b = TrackObservation::new(matched("B", "Two", None));
        engine.upsert("user-1", &[a.clone()], "lastfm", false).unwrap();

        let outcome = engine.upsert("user-1", &[a, b], "lastfm", false).unwrap();
        assert_eq!(outcome, UpsertOutcome { created: 1, updated: 1 });
    }
}
