//! Common test infrastructure
//!
//! Fixture catalog and scripted source adapters for end-to-end pipeline
//! tests. Tests should only import from this module, not from internal
//! submodules.

mod catalog;
mod sources;

// Public API - this is what tests import
pub use catalog::FixtureCatalog;
pub use sources::{historical_event, snapshot_event, ScriptedSource};

use scrobble_sync::catalog::CatalogEntry;

pub fn catalog_entry(id: &str, artist: &str, title: &str) -> CatalogEntry {
    CatalogEntry {
        id: id.to_string(),
        artist: artist.to_string(),
        title: title.to_string(),
        popularity: None,
    }
}
