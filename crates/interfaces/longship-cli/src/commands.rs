use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use longship_app_core::{setup, AnnouncementWatcher, UpdateController, UpdateEvent};
use longship_config::Settings;
use longship_core::{LocalEntry, PlanAction, SyncPlan};
use longship_infra::{default_http_client, Launcher};
use longship_persistence::CacheStats;
use longship_pipeline::SyncReport;
use longship_scanner::{ScanStats, Scanner, WalkOptions};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Cancel `token` on Ctrl-C until the returned task is aborted.
fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

fn target_dir(settings: &Settings, dir: Option<Utf8PathBuf>) -> Result<Utf8PathBuf> {
    match dir {
        Some(d) => Ok(d),
        None => setup::game_dir(settings),
    }
}

fn server_label(settings: &Settings) -> String {
    let s = &settings.server;
    format!("{}://{}:{}", s.protocol, s.host, s.port)
}

pub async fn cmd_sync(
    settings: &Settings,
    dir: Option<Utf8PathBuf>,
    no_cache: bool,
) -> Result<SyncReport> {
    let root = target_dir(settings, dir)?;
    println!(":: Synchronizing...");
    println!("   Server: {}", server_label(settings));
    println!("   Target: {}", root);

    let (controller, mut rx) = UpdateController::from_settings(settings, !no_cache)?;
    let cancel = CancellationToken::new();
    let ctrl_c = cancel_on_ctrl_c(cancel.clone());
    let handle = controller.start(root, cancel)?;
    // Leave the worker as the only sender, so a dead worker closes the channel.
    drop(controller);

    let pb = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_message("Fetching file list");

    let outcome = loop {
        match rx.recv().await {
            Some(UpdateEvent::Started { run_id }) => tracing::debug!("run {run_id} started"),
            Some(UpdateEvent::Progress(snap)) => {
                pb.set_length(snap.total as u64);
                pb.set_position(snap.current as u64);
                pb.set_message("Syncing");
            }
            Some(UpdateEvent::Retrying {
                attempt,
                max_attempts,
            }) => pb.set_message(format!(
                "Server is rebuilding its file list, retry {attempt}/{max_attempts}"
            )),
            Some(UpdateEvent::Finished(res)) => break Some(res),
            Some(UpdateEvent::Cancelled) => break None,
            Some(UpdateEvent::Announcement(_)) => {}
            None => break Some(Err("sync worker stopped unexpectedly".to_string())),
        }
    };
    ctrl_c.abort();
    tokio::task::spawn_blocking(move || handle.join()).await??;

    match outcome {
        Some(Ok(report)) => {
            pb.finish_with_message("Sync complete");
            print_report(&report);
            Ok(report)
        }
        Some(Err(reason)) => {
            pb.abandon_with_message("Update failed");
            anyhow::bail!("Update failed: {reason}")
        }
        None => {
            pb.abandon_with_message("Cancelled");
            anyhow::bail!("Update cancelled")
        }
    }
}

fn print_report(report: &SyncReport) {
    println!("\n:: Sync Result");
    println!("   Entries:        {}", report.total);
    println!("   Up to date:     {}", report.skipped);
    println!("   Created:        {}", report.created);
    println!("   Updated:        {}", report.updated);
    println!("   Removed:        {}", report.deleted);
    println!("   Changed:        {}", report.changed());
    println!("   From cache:     {}", report.cache_hits);
    println!("   Downloaded:     {}", report.network_fetches);
    if report.cache_write_failures > 0 {
        println!("   Cache failures: {}", report.cache_write_failures);
    }
}

/// Dry run: what `sync` would change.
pub async fn cmd_check(settings: &Settings, dir: Option<Utf8PathBuf>) -> Result<SyncPlan> {
    let root = target_dir(settings, dir)?;
    println!(":: Checking for updates...");
    println!("   Server: {}", server_label(settings));
    println!("   Local:  {}", root);

    let engine = setup::build_engine(settings, false)?;
    let pb = spinner();
    pb.set_message("Hashing local files...");
    let plan = engine.plan(&setup::sync_request(settings, root)).await;
    pb.finish_and_clear();
    let plan = plan?;

    for action in &plan.actions {
        match action {
            PlanAction::Create { path, kind } => println!("   + {path} ({kind})"),
            PlanAction::Update { path, .. } => println!("   ~ {path}"),
            PlanAction::Replace { path, from, to } => println!("   ! {path} ({from} -> {to})"),
            PlanAction::Delete { path } => println!("   - {path}"),
        }
    }

    println!("\n:: Update Check Result");
    println!("   Pending Transfers: {}", plan.transfers().count());
    println!("   Pending Deletes:   {}", plan.deletes().count());
    println!("   Up to date:        {}", plan.unchanged);
    if plan.is_empty() {
        println!("   Status:            Up to date");
    } else {
        println!("   Status:            Updates available (run `sync`)");
    }
    Ok(plan)
}

pub async fn cmd_status(settings: &Settings) -> Result<()> {
    println!(":: Status");
    println!("   Server:      {}", server_label(settings));
    println!("   Mirrors:     {}", settings.mirrors.len());
    match &settings.game_dir {
        Some(dir) if dir.is_dir() => println!("   Game dir:    {dir}"),
        Some(dir) => println!("   Game dir:    {dir} (missing)"),
        None => println!("   Game dir:    not set"),
    }
    if settings.cache_enabled {
        match setup::open_cache(settings) {
            Ok(store) => {
                let stats = store.stats();
                println!(
                    "   Cache:       {} ({} blobs, {})",
                    store.root(),
                    stats.records,
                    format_size(stats.bytes, DECIMAL)
                );
            }
            Err(e) => println!("   Cache:       unavailable ({e:#})"),
        }
    } else {
        println!("   Cache:       disabled");
    }

    let engine = setup::build_engine(settings, false)?;
    match engine.fetch_manifest().await {
        Ok(manifest) => println!(
            "   File list:   {} ({} entries)",
            manifest.status,
            manifest.entries.len()
        ),
        Err(e) => println!("   File list:   unreachable ({})", e.user_message()),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ScanOutput<'a> {
    root: &'a Utf8PathBuf,
    stats: ScanStats,
    entries: Vec<LocalEntry>,
}

pub async fn cmd_scan(
    path: Utf8PathBuf,
    output: Option<Utf8PathBuf>,
    no_hash: bool,
) -> Result<ScanStats> {
    println!(":: Scanning directory: {}", path);
    let opts = if no_hash {
        WalkOptions::paths_only()
    } else {
        WalkOptions::hashed()
    };

    let pb = spinner();
    pb.set_message("Walking...");
    let root = path.clone();
    let (entries, stats) =
        tokio::task::spawn_blocking(move || Scanner::scan_directory(&root, opts)).await??;
    pb.finish_with_message(format!(
        "Scanned {} files ({})",
        stats.files,
        format_size(stats.total_bytes, DECIMAL)
    ));

    let json = serde_json::to_string_pretty(&ScanOutput {
        root: &path,
        stats,
        entries,
    })?;
    if let Some(out) = output {
        std::fs::write(&out, json).with_context(|| format!("Failed to write {out}"))?;
        println!(":: Saved scan to {}", out);
    } else {
        println!("{}", json);
    }
    Ok(stats)
}

pub fn cmd_cache_info(settings: &Settings) -> Result<CacheStats> {
    let store = setup::open_cache(settings)?;
    let stats = store.stats();
    println!(":: Cache");
    println!("   Location: {}", store.root());
    println!("   Enabled:  {}", settings.cache_enabled);
    println!("   Blobs:    {}", stats.records);
    println!("   Size:     {}", format_size(stats.bytes, DECIMAL));
    Ok(stats)
}

pub fn cmd_cache_rebuild(settings: &Settings) -> Result<CacheStats> {
    let store = setup::open_cache(settings)?;
    println!(":: Rebuilding cache index at {}", store.root());
    let stats = store
        .rebuild_index()
        .context("Failed to rebuild cache index")?;
    println!(
        "   Indexed {} blobs ({})",
        stats.records,
        format_size(stats.bytes, DECIMAL)
    );
    Ok(stats)
}

/// Print the server announcement. With `watch`, keep polling until Ctrl-C.
pub async fn cmd_announcement(settings: &Settings, watch: bool) -> Result<Option<String>> {
    let client = default_http_client().context("Failed to build HTTP client")?;
    let urls = setup::server_urls(settings)?;

    if !watch {
        let mut watcher = AnnouncementWatcher::new(client, urls, 0);
        let text = watcher.poll().await;
        match &text {
            Some(t) => println!("{t}"),
            None => println!(":: No announcement"),
        }
        return Ok(text);
    }

    let interval = settings.announcement_refresh_interval.max(1);
    let watcher = AnnouncementWatcher::new(client, urls, interval);
    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let ctrl_c = cancel_on_ctrl_c(cancel.clone());
    let task = tokio::spawn(watcher.run(tx, cancel));

    let mut last = None;
    while let Some(ev) = rx.recv().await {
        if let UpdateEvent::Announcement(text) = ev {
            match &text {
                Some(t) => println!(":: {t}"),
                None => println!(":: (no announcement)"),
            }
            last = text;
        }
    }
    ctrl_c.abort();
    task.await?;
    Ok(last)
}

pub fn cmd_launch(settings: &Settings) -> Result<()> {
    println!(":: Launching {}", settings.launch_url);
    Launcher::new(settings.launch_url.clone())
        .launch()
        .context("Failed to launch the game")
}
