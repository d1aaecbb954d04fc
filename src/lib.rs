//! Listening-history synchronization and catalog-matching pipeline.
//!
//! Ingests a user's listening data from upstream music services, reconciles
//! each track against an external song catalog, and maintains a deduplicated
//! per-user library with resumable, checkpointed sync jobs.

pub mod catalog;
pub mod config;
pub mod library_store;
pub mod matcher;
pub mod normalize;
pub mod sources;
pub mod sync;
pub mod upsert;

// Re-export commonly used types for convenience
pub use catalog::{CatalogEntry, CatalogSearch, HttpCatalogClient};
pub use library_store::{LibraryStore, MemoryLibraryStore, SqliteLibraryStore, UserLibraryRecord};
pub use matcher::{MatchedTrack, TrackMatcher};
pub use sources::{LastfmSource, SourceAdapter, SpotifySource};
pub use sync::{SyncJob, SyncOrchestrator, SyncService, SyncStatus};
