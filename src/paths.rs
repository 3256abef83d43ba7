//! Application path management for portable and installed modes.
//!
//! - **Portable mode**: a `.portable` marker next to the executable keeps
//!   config, commands and logs in that directory.
//! - **Installed mode** (default): data lives under the platform data
//!   directory, in `MIDI vJoy GW`.

use crate::config::StorageBackend;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "MIDI vJoy GW";

/// Application paths for config, state, and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Saved commands live here
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Debug builds use the working directory when it holds a `config.yaml`.
    /// Runs before logging is initialized, so diagnostics go to stderr.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join("config.yaml").exists() {
                eprintln!("[paths] DEV mode, using {}", cwd.display());
                return Self::portable(&cwd);
            }
        }

        if exe_dir.join(".portable").exists() {
            return Self::portable(&exe_dir);
        }

        let base = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no platform data dir, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);
        Self::installed(&base)
    }

    /// Everything next to `dir`
    pub fn portable(dir: &Path) -> Self {
        Self {
            config: dir.join("config.yaml"),
            state_dir: dir.join(".state"),
            logs_dir: dir.join("logs"),
            is_portable: true,
        }
    }

    pub fn installed(base: &Path) -> Self {
        Self {
            config: base.join("config.yaml"),
            state_dir: base.join("state"),
            logs_dir: base.join("logs"),
            is_portable: false,
        }
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Default command storage location for a backend
    pub fn commands_path(&self, backend: StorageBackend) -> PathBuf {
        match backend {
            StorageBackend::Json => self.state_dir.join("commands.json"),
            StorageBackend::Sled => self.state_dir.join("commands.sled"),
        }
    }

    /// Ensure the state and logs directories exist.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [&self.state_dir, &self.logs_dir] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }
        Ok(())
    }
}
