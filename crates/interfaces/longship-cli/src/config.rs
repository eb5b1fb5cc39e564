//! `longship config ...`: view and edit the settings file.

use std::path::Path;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use longship_config::Settings;
use longship_infra::ServerUrls;

pub fn cmd_config_show(path: &Path) -> Result<Settings> {
    let settings = Settings::load_from(path)?;
    println!(":: Settings ({})", path.display());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(settings)
}

pub fn cmd_config_set_dir(path: &Path, dir: Utf8PathBuf) -> Result<Settings> {
    if !dir.is_dir() {
        anyhow::bail!("{dir} is not a directory");
    }
    let dir = dir
        .canonicalize_utf8()
        .with_context(|| format!("Failed to resolve {dir}"))?;

    let mut settings = Settings::load_from(path)?;
    settings.game_dir = Some(dir.clone());
    save(path, &settings)?;
    println!(":: Game directory set to {dir}");
    Ok(settings)
}

/// Probe the usual install locations and save the first hit as the game directory.
pub fn cmd_config_detect(path: &Path) -> Result<Option<Utf8PathBuf>> {
    cmd_config_detect_in(path, longship_config::candidate_game_dirs())
}

pub fn cmd_config_detect_in(
    path: &Path,
    candidates: Vec<Utf8PathBuf>,
) -> Result<Option<Utf8PathBuf>> {
    println!(":: Looking for the game directory...");
    let Some(found) = candidates.into_iter().next() else {
        println!("   Not found. Set it with `longship config set-dir <dir>`.");
        return Ok(None);
    };
    println!("   Found: {found}");
    cmd_config_set_dir(path, found.clone())?;
    Ok(Some(found))
}

pub fn cmd_config_set_server(
    path: &Path,
    host: String,
    port: Option<u16>,
    protocol: Option<String>,
) -> Result<Settings> {
    let mut settings = Settings::load_from(path)?;
    let mut server = settings.server.clone();
    server.host = host;
    if let Some(port) = port {
        server.port = port;
    }
    if let Some(protocol) = protocol {
        if protocol != "http" && protocol != "https" {
            anyhow::bail!("unsupported protocol {protocol:?} (use http or https)");
        }
        server.protocol = protocol;
    }
    ServerUrls::new(&server).context("Invalid server address")?;

    settings.server = server;
    save(path, &settings)?;
    let s = &settings.server;
    println!(":: Server set to {}://{}:{}", s.protocol, s.host, s.port);
    Ok(settings)
}

fn save(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    settings.save_to(path)
}
