//! Catalog collaborator contract.
//!
//! The catalog's own index/search implementation lives elsewhere; this core
//! only consumes its query endpoints, read-only.

mod client;

pub use client::HttpCatalogClient;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One song in the external catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub artist: String,
    pub title: String,
    /// Implementation-defined popularity signal, higher is more popular.
    #[serde(default)]
    pub popularity: Option<i64>,
}

/// Read-only query surface of the catalog service.
///
/// `search` returns candidates in the catalog's own ranked order; callers
/// must not assume anything beyond "more relevant first". `batch_lookup`
/// resolves exact normalized pairs in one round-trip for throughput.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<CatalogEntry>>;

    /// Resolve exact normalized `(artist, title)` pairs. Pairs with no exact
    /// match are simply absent from the returned map.
    async fn batch_lookup(
        &self,
        pairs: &[(String, String)],
    ) -> Result<HashMap<(String, String), CatalogEntry>>;
}
