//! Launcher settings: defaults, runtime limits and the on-disk `settings.json`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use directories::ProjectDirs;
use longship_core::{Mirror, ServerEndpoint, DEFAULT_DELETABLE_PREFIXES};
pub use longship_infra::DEFAULT_LAUNCH_URL;
use serde::{Deserialize, Serialize};

mod detect;

pub use detect::{candidate_game_dirs, candidate_game_dirs_in, possible_game_dirs};

const QUALIFIER: &str = "com";
const ORG: &str = "longship";
const APP: &str = "launcher";

pub const SETTINGS_FILENAME: &str = "settings.json";

/// Seconds between announcement polls. Zero polls once.
pub const DEFAULT_ANNOUNCEMENT_REFRESH_SECS: u64 = 60;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_SECS: u64 = 3;

/// Upper bound for `retry.max_attempts`.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff_secs: DEFAULT_RETRY_BACKOFF_SECS,
        }
    }
}

impl RetrySettings {
    /// Attempts clamped into `1..=MAX_RETRY_ATTEMPTS`.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.clamp(1, MAX_RETRY_ATTEMPTS)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerEndpoint,
    pub mirrors: Vec<Mirror>,
    /// Game directory to keep in sync. `None` until the user picks one.
    pub game_dir: Option<Utf8PathBuf>,
    /// Blob cache location. `None` uses the platform cache dir.
    pub cache_dir: Option<Utf8PathBuf>,
    pub cache_enabled: bool,
    pub deletable_prefixes: Vec<String>,
    pub announcement_refresh_interval: u64,
    pub log_level: String,
    pub launch_url: String,
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerEndpoint::default(),
            mirrors: Vec::new(),
            game_dir: None,
            cache_dir: None,
            cache_enabled: true,
            deletable_prefixes: DEFAULT_DELETABLE_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            announcement_refresh_interval: DEFAULT_ANNOUNCEMENT_REFRESH_SECS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            launch_url: DEFAULT_LAUNCH_URL.to_string(),
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    /// Load from the platform config dir. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&settings_path()?)
    }

    pub fn save(&self) -> Result<()> {
        let path = settings_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        self.save_to(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings {}", path.display()))?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        atomic_write(path, json.as_bytes()).context("Failed to write settings")
    }

    /// Configured cache dir, or the platform default.
    pub fn resolved_cache_dir(&self) -> Result<Utf8PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_cache_dir(),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORG, APP)
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join(SETTINGS_FILENAME))
}

pub fn default_cache_dir() -> Result<Utf8PathBuf> {
    let dir = project_dirs()?.cache_dir().join("blobs");
    Utf8PathBuf::from_path_buf(dir)
        .map_err(|p| anyhow::anyhow!("Cache directory {} is not valid UTF-8", p.display()))
}

/// Write `contents` to a sibling temp file, sync it, then rename over `path`.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = {
        let mut name = path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    };

    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp file {}", tmp_path.display()))?;
    file.write_all(contents)
        .with_context(|| format!("Failed to write temp file {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync temp file {}", tmp_path.display()))?;
    drop(file);

    match fs::rename(&tmp_path, path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            fs::remove_file(path).ok();
            fs::rename(&tmp_path, path).with_context(|| {
                format!("Failed to replace destination file {}", path.display())
            })?;
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(e).with_context(|| {
                format!(
                    "Failed to rename temp file {} to {}",
                    tmp_path.display(),
                    path.display()
                )
            });
        }
    }

    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
