//! Turning saved settings into a ready engine.

use std::sync::Arc;

use anyhow::Context;
use camino::Utf8PathBuf;
use longship_config::Settings;
use longship_infra::{default_http_client, ServerUrls};
use longship_persistence::{BlobCache, CacheStore};
use longship_pipeline::{default_engine, DefaultSyncEngine, RetryPolicy, SyncOptions, SyncRequest};

pub fn sync_options(settings: &Settings) -> SyncOptions {
    SyncOptions {
        deletable_prefixes: settings.deletable_prefixes.clone(),
        retry: RetryPolicy {
            max_attempts: settings.retry.attempts(),
            backoff: settings.retry.backoff(),
        },
    }
}

pub fn sync_request(settings: &Settings, root: impl Into<Utf8PathBuf>) -> SyncRequest {
    SyncRequest {
        local_root: root.into(),
        options: sync_options(settings),
    }
}

/// The configured game directory, or an error telling the user how to set one.
pub fn game_dir(settings: &Settings) -> anyhow::Result<Utf8PathBuf> {
    settings
        .game_dir
        .clone()
        .context("No game directory configured (run `longship config detect` or `longship config set-dir <dir>`)")
}

pub fn server_urls(settings: &Settings) -> anyhow::Result<ServerUrls> {
    ServerUrls::new(&settings.server).context("Invalid server address")
}

pub fn open_cache(settings: &Settings) -> anyhow::Result<CacheStore> {
    let dir = settings.resolved_cache_dir()?;
    CacheStore::open(&dir).with_context(|| format!("Failed to open cache at {dir}"))
}

/// Engine for the configured server and mirrors. The cache is attached when enabled in
/// settings and `use_cache` is set. A cache that cannot be opened is logged and skipped.
pub fn build_engine(settings: &Settings, use_cache: bool) -> anyhow::Result<DefaultSyncEngine> {
    let client = default_http_client().context("Failed to build HTTP client")?;
    let cache: Option<Arc<dyn BlobCache>> = if use_cache && settings.cache_enabled {
        match open_cache(settings) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::warn!("continuing without cache: {e:#}");
                None
            }
        }
    } else {
        None
    };
    default_engine(client, &settings.server, settings.mirrors.clone(), cache)
        .context("Failed to set up sync engine")
}
