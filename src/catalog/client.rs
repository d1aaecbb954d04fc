//! HTTP client for the catalog service's query endpoints.

use super::{CatalogEntry, CatalogSearch};
use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpCatalogClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<CatalogEntry>,
}

#[derive(Serialize)]
struct LookupRequest<'a> {
    pairs: Vec<LookupPair<'a>>,
}

#[derive(Serialize)]
struct LookupPair<'a> {
    artist: &'a str,
    title: &'a str,
}

#[derive(Deserialize)]
struct LookupResponse {
    results: Vec<LookupHit>,
}

#[derive(Deserialize)]
struct LookupHit {
    artist: String,
    title: String,
    entry: CatalogEntry,
}

impl HttpCatalogClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl CatalogSearch for HttpCatalogClient {
    async fn search(&self, query: &str) -> Result<Vec<CatalogEntry>> {
        let url = format!(
            "{}/search?q={}",
            self.base_url,
            urlencoding::encode(query)
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Catalog search failed with status {}", response.status());
        }
        let body: SearchResponse = response.json().await?;
        Ok(body.results)
    }

    async fn batch_lookup(
        &self,
        pairs: &[(String, String)],
    ) -> Result<HashMap<(String, String), CatalogEntry>> {
        if pairs.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/lookup", self.base_url);
        let request = LookupRequest {
            pairs: pairs
                .iter()
                .map(|(artist, title)| LookupPair { artist, title })
                .collect(),
        };
        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Catalog lookup failed with status {}", response.status());
        }
        let body: LookupResponse = response.json().await?;
        Ok(body
            .results
            .into_iter()
            .map(|hit| ((hit.artist, hit.title), hit.entry))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = HttpCatalogClient::new("http://catalog.local/").unwrap();
        assert_eq!(client.base_url, "http://catalog.local");
    }

    #[test]
    fn test_search_response_parsing() {
        let json = r#"{
            "results": [
                {"id": "cat-1", "artist": "queen", "title": "bohemian rhapsody", "popularity": 98},
                {"id": "cat-2", "artist": "queen", "title": "bohemian rhapsody"}
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].popularity, Some(98));
        assert_eq!(parsed.results[1].popularity, None);
    }

    #[test]
    fn test_lookup_response_parsing() {
        let json = r#"{
            "results": [
                {
                    "artist": "queen",
                    "title": "bohemian rhapsody",
                    "entry": {"id": "cat-1", "artist": "Queen", "title": "Bohemian Rhapsody"}
                }
            ]
        }"#;
        let parsed: LookupResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results[0].entry.id, "cat-1");
    }
}
