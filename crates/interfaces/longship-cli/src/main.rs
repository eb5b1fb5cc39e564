use std::path::PathBuf;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use longship_cli::{commands, config, init_logging};
use longship_config::Settings;

#[derive(Parser)]
#[command(name = "longship", author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Settings file to use instead of the platform default
    #[arg(long, global = true, env = "LONGSHIP_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the game directory in line with the server
    Sync {
        #[arg(long, help = "Game directory (defaults to the configured one)")]
        dir: Option<Utf8PathBuf>,
        #[arg(long, help = "Skip the local blob cache for this run")]
        no_cache: bool,
    },
    /// Show what `sync` would change without writing anything
    Check {
        #[arg(long)]
        dir: Option<Utf8PathBuf>,
    },
    /// Settings summary, cache usage and server readiness
    Status,
    /// Walk a directory and print or save its entries
    Scan {
        path: Utf8PathBuf,
        #[arg(short, long)]
        output: Option<Utf8PathBuf>,
        #[arg(long)]
        no_hash: bool,
    },
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Print the server announcement
    Announcement {
        #[arg(long, help = "Keep polling until Ctrl-C")]
        watch: bool,
    },
    /// Start the game through Steam
    Launch,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    Info,
    /// Re-index blobs on disk, dropping entries whose content no longer matches
    Rebuild,
}

#[derive(Subcommand)]
enum ConfigCommands {
    Show,
    /// Find the game directory in the usual Steam locations and save it
    Detect,
    SetDir {
        dir: Utf8PathBuf,
    },
    SetServer {
        host: String,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        protocol: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(p) => p,
        None => longship_config::settings_path()?,
    };
    let settings = Settings::load_from(&config_path)?;
    init_logging(cli.verbose, &settings.log_level);
    tracing::debug!("settings loaded from {}", config_path.display());

    match cli.command {
        Commands::Sync { dir, no_cache } => {
            commands::cmd_sync(&settings, dir, no_cache).await?;
        }
        Commands::Check { dir } => {
            commands::cmd_check(&settings, dir).await?;
        }
        Commands::Status => commands::cmd_status(&settings).await?,
        Commands::Scan {
            path,
            output,
            no_hash,
        } => {
            commands::cmd_scan(path, output, no_hash).await?;
        }
        Commands::Cache { command } => match command {
            CacheCommands::Info => {
                commands::cmd_cache_info(&settings)?;
            }
            CacheCommands::Rebuild => {
                commands::cmd_cache_rebuild(&settings)?;
            }
        },
        Commands::Announcement { watch } => {
            commands::cmd_announcement(&settings, watch).await?;
        }
        Commands::Launch => commands::cmd_launch(&settings)?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                config::cmd_config_show(&config_path)?;
            }
            ConfigCommands::Detect => {
                config::cmd_config_detect(&config_path)?;
            }
            ConfigCommands::SetDir { dir } => {
                config::cmd_config_set_dir(&config_path, dir)?;
            }
            ConfigCommands::SetServer {
                host,
                port,
                protocol,
            } => {
                config::cmd_config_set_server(&config_path, host, port, protocol)?;
            }
        },
    }

    Ok(())
}
