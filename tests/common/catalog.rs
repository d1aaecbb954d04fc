use anyhow::Result;
use scrobble_sync::catalog::{CatalogEntry, CatalogSearch};
use scrobble_sync::normalize::NormalizedTrack;
use std::collections::HashMap;

/// In-memory catalog over a fixed entry list. Search matches every query
/// word against "artist title"; ordering follows insertion order.
pub struct FixtureCatalog {
    entries: Vec<CatalogEntry>,
}

impl FixtureCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self { entries: vec![] }
    }
}

#[async_trait::async_trait]
impl CatalogSearch for FixtureCatalog {
    async fn search(&self, query: &str) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| {
                let haystack = format!("{} {}", e.artist, e.title).to_lowercase();
                query.split_whitespace().all(|word| haystack.contains(word))
            })
            .cloned()
            .collect())
    }

    async fn batch_lookup(
        &self,
        pairs: &[(String, String)],
    ) -> Result<HashMap<(String, String), CatalogEntry>> {
        let mut hits = HashMap::new();
        for entry in &self.entries {
            let normalized = NormalizedTrack::from_raw(&entry.artist, &entry.title);
            let pair = (normalized.artist, normalized.title);
            if pairs.contains(&pair) {
                hits.entry(pair).or_insert_with(|| entry.clone());
            }
        }
        Ok(hits)
    }
}
