//! Application context: the concrete adapters wired into the use cases.
//!
//! Built once per command invocation from [`Settings`] plus CLI overrides.
//! Holds the concrete types next to the engine so commands that are not part
//! of the apply cycle (`add`, `backups`, `prune`, `preview`) can reach them.
//!
//! Preset data dirs come from `paths.data_dirs` when set.  Otherwise, for
//! commands that look themes up, fastfetch is asked with
//! `--list-data-paths`, and the fixed fallback list is used if that fails.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::application::catalog::ThemeCatalog;
use crate::application::safe_apply::SafeApplyEngine;
use crate::infrastructure::backup::FileBackupStore;
use crate::infrastructure::locator::FsConfigLocator;
use crate::infrastructure::probe::SubprocessProbe;
use crate::infrastructure::storage::config::{ConfigError, Settings};

/// Values from the command line that take precedence over the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub active_config: Option<PathBuf>,
    pub timeout: Option<Duration>,
    /// Ask the probe program for its data dirs.
    pub detect_data_paths: bool,
}

/// Shared state for one CLI invocation.
pub struct AppContext {
    pub settings: Settings,
    pub locator: Arc<FsConfigLocator>,
    pub store: Arc<FileBackupStore>,
    pub probe: Arc<SubprocessProbe>,
    pub catalog: ThemeCatalog,
    pub engine: SafeApplyEngine,
}

impl AppContext {
    /// Wires file-system and subprocess adapters from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoBackupDir`] when no snapshot directory can be
    /// determined.
    pub async fn new(settings: Settings, overrides: Overrides) -> Result<Self, ConfigError> {
        let mut paths = settings.locator_paths();
        if let Some(active) = overrides.active_config {
            paths.active_override = Some(active);
        }
        let backup_dir = settings.backup_dir().ok_or(ConfigError::NoBackupDir)?;

        let probe = Arc::new(SubprocessProbe::new(
            settings.probe_command(),
            settings.probe.tail_lines,
        ));
        let mut options = settings.apply_options();
        if let Some(timeout) = overrides.timeout {
            options.timeout = timeout;
        }

        if overrides.detect_data_paths && settings.paths.data_dirs.is_none() {
            match probe.data_paths(options.timeout).await {
                Some(detected) => paths.data_dirs = detected,
                None => debug!("fastfetch did not report data paths; using fallback dirs"),
            }
        }
        debug!(?paths, backup_dir = %backup_dir.display(), "context paths resolved");

        let locator = Arc::new(FsConfigLocator::new(paths));
        let store = Arc::new(FileBackupStore::new(backup_dir, settings.backup.keep));

        let catalog = ThemeCatalog::new(locator.clone());
        let engine = SafeApplyEngine::new(locator.clone(), store.clone(), probe.clone(), options);

        Ok(Self {
            settings,
            locator,
            store,
            probe,
            catalog,
            engine,
        })
    }
}
