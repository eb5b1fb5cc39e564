use std::process::Stdio;
use thiserror::Error;
use tracing::info;

/// Valheim's Steam app id.
pub const DEFAULT_LAUNCH_URL: &str = "steam://rungameid/892970";

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Launch configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Launcher {
    url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedLaunchCommand {
    pub program: String,
    pub args: Vec<String>,
}

fn opener_command(url: &str) -> ResolvedLaunchCommand {
    #[cfg(target_os = "windows")]
    {
        // The empty argument is the window title `start` expects before the target.
        ResolvedLaunchCommand {
            program: "cmd".to_string(),
            args: vec!["/C".into(), "start".into(), String::new(), url.to_string()],
        }
    }

    #[cfg(target_os = "macos")]
    {
        ResolvedLaunchCommand {
            program: "open".to_string(),
            args: vec![url.to_string()],
        }
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        ResolvedLaunchCommand {
            program: "xdg-open".to_string(),
            args: vec![url.to_string()],
        }
    }
}

impl Launcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub(crate) fn resolve_command(&self) -> Result<ResolvedLaunchCommand, LaunchError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(LaunchError::Config("launch url is empty".into()));
        }
        if !url.contains("://") {
            return Err(LaunchError::Config(format!(
                "launch url {url:?} has no scheme"
            )));
        }
        Ok(opener_command(url))
    }

    /// Hand the launch URL to the platform opener. Returns once the opener is spawned.
    pub fn launch(&self) -> Result<(), LaunchError> {
        let cmd = self.resolve_command()?;

        info!(program = %cmd.program, args = ?cmd.args, "Launching game");

        std::process::Command::new(&cmd.program)
            .args(&cmd.args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;
        Ok(())
    }
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new(DEFAULT_LAUNCH_URL)
    }
}
