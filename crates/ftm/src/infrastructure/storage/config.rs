//! TOML-based settings persistence for ftm.
//!
//! Reads and writes [`Settings`] to the platform-appropriate settings file:
//! - Linux:    `$XDG_CONFIG_HOME/ftm/config.toml` (or `~/.config/ftm/config.toml`)
//! - macOS:    `~/Library/Application Support/ftm/config.toml`
//! - Windows:  `%APPDATA%\ftm\config.toml`
//!
//! # What is TOML? (for beginners)
//!
//! TOML (Tom's Obvious Minimal Language) is a configuration file format designed
//! to be easy to read and write.  Example:
//!
//! ```toml
//! [probe]
//! program = "fastfetch"
//! args = ["--config", "{config}"]
//! timeout_ms = 5000
//!
//! [backup]
//! keep = 5
//! ```
//!
//! # Serde default values
//!
//! Every section and every field carries a serde default, so an empty file,
//! a file from an older ftm, or no file at all all load successfully.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::safe_apply::ApplyOptions;
use crate::infrastructure::backup::DEFAULT_KEEP;
use crate::infrastructure::dirs;
use crate::infrastructure::locator::LocatorPaths;
use crate::infrastructure::probe::{ProbeCommand, DEFAULT_TAIL_LINES};

/// Error type for settings file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// No backup directory is configured and no data directory could be determined.
    #[error("could not determine a directory for snapshots; set paths.backup_dir")]
    NoBackupDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing settings at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The settings could not be serialized to TOML.
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Settings schema types ─────────────────────────────────────────────────────

/// Top-level settings stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub probe: ProbeSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub backup: BackupSettings,
    #[serde(default)]
    pub apply: ApplySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// How fastfetch is invoked to validate a configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeSettings {
    /// Program name or path, looked up on `PATH`.
    #[serde(default = "default_program")]
    pub program: String,
    /// Argument template; `{config}` is replaced by the configuration path.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Milliseconds before a probe is killed and counted as a timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Lines of output kept per stream for diagnostics.
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
}

/// Path overrides.  Unset fields use the XDG defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PathSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_config: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_themes_dir: Option<PathBuf>,
    /// Replaces the default data directories entirely when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dirs: Option<Vec<PathBuf>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupSettings {
    /// Number of snapshots retained.
    #[serde(default = "default_keep")]
    pub keep: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApplySettings {
    /// Probe the restored configuration after a rollback.
    #[serde(default)]
    pub verify_restored: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    /// `tracing` filter used when `RUST_LOG` is unset, e.g. `"warn"` or `"ftm=debug"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_program() -> String {
    ProbeCommand::default().program
}
fn default_args() -> Vec<String> {
    ProbeCommand::default().args
}
fn default_timeout_ms() -> u64 {
    5_000
}
fn default_tail_lines() -> usize {
    DEFAULT_TAIL_LINES
}
fn default_keep() -> usize {
    DEFAULT_KEEP
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            timeout_ms: default_timeout_ms(),
            tail_lines: default_tail_lines(),
        }
    }
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self { keep: default_keep() }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Conversions into runtime types ────────────────────────────────────────────

impl Settings {
    pub fn probe_command(&self) -> ProbeCommand {
        ProbeCommand {
            program: self.probe.program.clone(),
            args: self.probe.args.clone(),
        }
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            timeout: Duration::from_millis(self.probe.timeout_ms),
            verify_restored: self.apply.verify_restored,
        }
    }

    /// Environment defaults with the `[paths]` overrides applied.
    pub fn locator_paths(&self) -> LocatorPaths {
        let mut paths = LocatorPaths::from_env();
        if let Some(active) = &self.paths.active_config {
            paths.active_override = Some(active.clone());
        }
        if let Some(user) = &self.paths.user_themes_dir {
            paths.user_themes_dir = Some(user.clone());
        }
        if let Some(data_dirs) = &self.paths.data_dirs {
            paths.data_dirs = data_dirs.clone();
        }
        paths
    }

    /// `paths.backup_dir`, or `$XDG_DATA_HOME/ftm/backups`.
    pub fn backup_dir(&self) -> Option<PathBuf> {
        self.paths
            .backup_dir
            .clone()
            .or_else(|| dirs::data_home().map(|home| home.join("ftm").join("backups")))
    }
}

// ── Settings repository ───────────────────────────────────────────────────────

/// Resolves the default settings file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn settings_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads [`Settings`] from `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `settings` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(settings)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `ftm` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("ftm"))
    }

    #[cfg(target_os = "macos")]
    {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support").join("ftm"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        dirs::config_home().map(|base| base.join("ftm"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
