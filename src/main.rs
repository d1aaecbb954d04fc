use anyhow::{Context, Result};
use clap::Parser;
use scrobble_sync::config::{AppConfig, CliConfig, FileConfig};
use scrobble_sync::library_store::{LibraryStore, SqliteLibraryStore};
use scrobble_sync::sources::{LastfmSource, SourceAdapter, SpotifySource};
use scrobble_sync::sync::{LogNotifier, SyncJob, SyncOrchestrator, SyncStatus};
use scrobble_sync::HttpCatalogClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[clap(name = "sync-worker")]
struct CliArgs {
    /// User whose library to synchronize.
    #[clap(long)]
    pub user: String,

    /// Directory holding the library database.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Base URL of the catalog service.
    #[clap(long)]
    pub catalog_url: Option<String>,

    /// Path to a TOML config file; its values override CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Wall-clock budget for this invocation in seconds. When exceeded the
    /// job stops at the next batch boundary and stays resumable.
    #[clap(long)]
    pub max_runtime_secs: Option<u64>,

    /// Last.fm API key (requires --lastfm-username).
    #[clap(long)]
    pub lastfm_api_key: Option<String>,

    /// Last.fm username whose scrobbles to sync.
    #[clap(long)]
    pub lastfm_username: Option<String>,

    /// Spotify OAuth access token.
    #[clap(long)]
    pub spotify_access_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        catalog_url: cli_args.catalog_url.clone(),
        max_runtime_secs: cli_args.max_runtime_secs,
        lastfm_api_key: cli_args.lastfm_api_key.clone(),
        lastfm_username: cli_args.lastfm_username.clone(),
        spotify_access_token: cli_args.spotify_access_token.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!(
        "Opening library database at {:?}...",
        config.library_db_path()
    );
    let store: Arc<dyn LibraryStore> = Arc::new(SqliteLibraryStore::new(config.library_db_path())?);

    let catalog = Arc::new(HttpCatalogClient::new(&config.catalog_url)?);

    let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    if let Some(token) = &config.spotify_access_token {
        sources.push(Arc::new(SpotifySource::new(token)?));
    }
    if let (Some(api_key), Some(username)) = (&config.lastfm_api_key, &config.lastfm_username) {
        sources.push(Arc::new(LastfmSource::new(api_key, username)?));
    }
    if sources.is_empty() {
        anyhow::bail!("No sources configured; provide Spotify or Last.fm credentials");
    }
    info!(
        "Configured sources: {}",
        sources
            .iter()
            .map(|s| s.name().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let orchestrator = SyncOrchestrator::new(
        store.clone(),
        catalog,
        sources,
        Arc::new(LogNotifier),
        config.sync.clone(),
    );

    let cancel = CancellationToken::new();

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping at the next batch boundary");
            ctrl_c_cancel.cancel();
        }
    });

    if let Some(budget) = config.max_runtime_secs {
        let budget_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(budget)).await;
            warn!(
                "Runtime budget of {}s exceeded, stopping at the next batch boundary",
                budget
            );
            budget_cancel.cancel();
        });
    }

    // Resume the latest unfinished job for this user, or start a fresh one.
    let job_id = match store.list_jobs(&cli_args.user, 1)?.into_iter().next() {
        Some(latest) if !latest.status.is_terminal() => {
            info!("Resuming sync job {}", latest.id);
            latest.id
        }
        _ => {
            let job = SyncJob::new(&cli_args.user);
            store.put_job(&job)?;
            info!("Created sync job {}", job.id);
            job.id
        }
    };

    let job = orchestrator.run(&job_id, &cancel).await?;

    for result in &job.results {
        match &result.error {
            Some(error) => error!(
                "{}: {} fetched, {} matched, {} created, {} updated, error: {}",
                result.source,
                result.items_fetched,
                result.items_matched,
                result.records_created,
                result.records_updated,
                error
            ),
            None => info!(
                "{}: {} fetched, {} matched, {} created, {} updated",
                result.source,
                result.items_fetched,
                result.items_matched,
                result.records_created,
                result.records_updated
            ),
        }
    }

    match job.status {
        SyncStatus::Completed => {
            info!("Sync job {} completed", job.id);
            Ok(())
        }
        SyncStatus::InProgress => {
            info!(
                "Sync job {} suspended, re-invoke to resume from the last checkpoint",
                job.id
            );
            Ok(())
        }
        SyncStatus::Failed => {
            anyhow::bail!(
                "Sync job {} failed: {}",
                job.id,
                job.error.as_deref().unwrap_or("unknown error")
            )
        }
        SyncStatus::Pending => unreachable!("job cannot remain pending after an invocation"),
    }
}
