mod file_config;

pub use file_config::{FileConfig, LastfmConfig, SpotifyConfig, SyncConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub catalog_url: Option<String>,
    pub max_runtime_secs: Option<u64>,
    pub lastfm_api_key: Option<String>,
    pub lastfm_username: Option<String>,
    pub spotify_access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub catalog_url: String,
    /// Wall-clock budget for one invocation; the scheduler re-invokes later.
    pub max_runtime_secs: Option<u64>,

    // Source credentials; a source without credentials is simply not wired.
    pub lastfm_api_key: Option<String>,
    pub lastfm_username: Option<String>,
    pub spotify_access_token: Option<String>,

    // Pipeline tuning (with defaults)
    pub sync: SyncSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        // Validate db_dir exists
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let catalog_url = file
            .catalog_url
            .or_else(|| cli.catalog_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("catalog_url must be specified via --catalog-url or in config file")
            })?;

        let max_runtime_secs = file.max_runtime_secs.or(cli.max_runtime_secs);

        let lastfm_file = file.lastfm.unwrap_or_default();
        let lastfm_api_key = lastfm_file.api_key.or_else(|| cli.lastfm_api_key.clone());
        let lastfm_username = lastfm_file.username.or_else(|| cli.lastfm_username.clone());
        if lastfm_api_key.is_some() != lastfm_username.is_some() {
            bail!("Last.fm requires both an api key and a username");
        }

        let spotify_access_token = file
            .spotify
            .unwrap_or_default()
            .access_token
            .or_else(|| cli.spotify_access_token.clone());

        // Sync settings - merge file config with defaults
        let sync_file = file.sync.unwrap_or_default();
        let defaults = SyncSettings::default();
        let sync = SyncSettings {
            batch_size: sync_file.batch_size.unwrap_or(defaults.batch_size),
            page_size: sync_file.page_size.unwrap_or(defaults.page_size),
            match_concurrency: sync_file
                .match_concurrency
                .unwrap_or(defaults.match_concurrency),
        };
        if sync.batch_size == 0 || sync.page_size == 0 {
            bail!("sync batch_size and page_size must be greater than zero");
        }

        Ok(Self {
            db_dir,
            catalog_url,
            max_runtime_secs,
            lastfm_api_key,
            lastfm_username,
            spotify_access_token,
            sync,
        })
    }

    pub fn library_db_path(&self) -> PathBuf {
        self.db_dir.join("library.db")
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Events accumulated from the history stream before a match/upsert/
    /// checkpoint round.
    pub batch_size: usize,
    /// Page size requested from history-capable sources.
    pub page_size: usize,
    /// Concurrent catalog lookups within one batch.
    pub match_concurrency: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            page_size: 200,
            match_concurrency: 8,
        }
    }
}
