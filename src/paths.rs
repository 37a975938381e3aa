//! Where Nakama keeps its files
//!
//! ## Mode Detection
//!
//! - **Dev mode** (debug builds): a `config.yaml` in the working directory
//!   means everything lives next to it.
//! - **Portable mode**: a `.portable` marker next to the executable keeps
//!   config, settings and logs beside the binary.
//! - **Installed mode** (default): the platform data directory
//!   (`~/.local/share/Nakama`, `%APPDATA%\Nakama`, ...).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "Nakama";

/// Application paths for config, settings and logs
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Directory of the settings database
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the paths for this run
    ///
    /// Called before logging is initialized, hence `eprintln!` for the
    /// debug-build diagnostics.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join("config.yaml").exists() {
                eprintln!("[paths] DEV mode (config.yaml found in {})", cwd.display());
                return Self::rooted_at(&cwd, true);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] PORTABLE mode (.portable marker found)");
            return Self::rooted_at(&exe_dir, true);
        }

        let app_data = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no data directory, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!("[paths] INSTALLED mode (data dir: {})", app_data.display());

        Self {
            config: app_data.join("config.yaml"),
            state_dir: app_data.join("state"),
            logs_dir: app_data.join("logs"),
            is_portable: false,
        }
    }

    /// Layout with every file under `base`
    pub fn rooted_at(base: &Path, is_portable: bool) -> Self {
        Self {
            config: base.join("config.yaml"),
            state_dir: base.join(".state"),
            logs_dir: base.join("logs"),
            is_portable,
        }
    }

    /// Create the state and logs directories
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.state_dir, &self.logs_dir] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }
        Ok(())
    }

    /// Path of the sled settings database
    pub fn settings_db_path(&self) -> PathBuf {
        self.state_dir.join("settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rooted_layout() {
        let paths = AppPaths::rooted_at(Path::new("test"), true);
        assert!(paths.is_portable);
        assert_eq!(paths.config, PathBuf::from("test/config.yaml"));
        assert_eq!(paths.settings_db_path(), PathBuf::from("test/.state/settings"));
    }

    #[test]
    fn test_ensure_directories() {
        let temp = TempDir::new().unwrap();
        let paths = AppPaths::rooted_at(temp.path(), true);
        paths.ensure_directories().unwrap();
        assert!(paths.state_dir.is_dir());
        assert!(paths.logs_dir.is_dir());
        // Second call is a no-op
        paths.ensure_directories().unwrap();
    }
}
