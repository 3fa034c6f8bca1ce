//! File-system [`ConfigLocator`].
//!
//! Search roots, in walk order:
//!
//! 1. system presets: `<data_dir>/presets` and `<data_dir>/fastfetch/presets`
//!    for every data dir;
//! 2. bundled examples: the `examples` sub-directory of each preset dir;
//! 3. user themes: `$XDG_DATA_HOME/fastfetch/themes` unless overridden.
//!
//! Within a directory files are visited in file-name order.  Unreadable or
//! missing directories are skipped silently.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ftm_core::{dedup_by_precedence, is_theme_file, ApplyError, ThemeDescriptor, ThemeOrigin};
use thiserror::Error;
use tracing::{debug, info, trace};

use super::dirs;
use crate::application::ports::ConfigLocator;

/// File names fastfetch reads from its config directory, in preference order.
const ACTIVE_FILE_NAMES: [&str; 2] = ["config.jsonc", "config.json"];

/// Data directories fastfetch installs presets into when it cannot be asked.
const SYSTEM_DATA_DIRS: [&str; 2] = ["/usr/share/fastfetch", "/usr/local/share/fastfetch"];

/// Where the locator looks.  Built from the environment and then overridden
/// by settings and CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocatorPaths {
    /// Explicit active configuration path; bypasses the standard lookup.
    pub active_override: Option<PathBuf>,
    /// Base config directory (`$XDG_CONFIG_HOME`); `None` if it cannot be determined.
    pub config_home: Option<PathBuf>,
    /// Data directories searched for presets, in order.
    pub data_dirs: Vec<PathBuf>,
    /// Directory holding user themes.
    pub user_themes_dir: Option<PathBuf>,
}

impl LocatorPaths {
    /// Default search paths for the current user.  The data dirs are the
    /// fixed fallback list; callers replace them with what fastfetch reports
    /// when it can be asked.
    pub fn from_env() -> Self {
        let data_home = dirs::data_home();
        Self {
            active_override: None,
            config_home: dirs::config_home(),
            data_dirs: fallback_data_dirs(dirs::home_dir().as_deref(), data_home.as_deref()),
            user_themes_dir: data_home.map(|home| home.join("fastfetch").join("themes")),
        }
    }
}

/// System data dirs, then `~/fastfetch`, then `<data_home>/fastfetch`.
pub fn fallback_data_dirs(home: Option<&Path>, data_home: Option<&Path>) -> Vec<PathBuf> {
    let mut data_dirs: Vec<PathBuf> = SYSTEM_DATA_DIRS.iter().map(PathBuf::from).collect();
    data_dirs.extend(home.map(|home| home.join("fastfetch")));
    data_dirs.extend(data_home.map(|data| data.join("fastfetch")));
    data_dirs
}

/// Errors from installing a user theme.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("no user theme directory could be determined")]
    NoUserDir,

    #[error("invalid theme name '{0}'")]
    InvalidName(String),

    #[error("'{}' is not a regular file", .0.display())]
    NotAFile(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Locates fastfetch's configuration and themes on the local file system.
#[derive(Debug, Clone)]
pub struct FsConfigLocator {
    paths: LocatorPaths,
}

impl FsConfigLocator {
    pub fn new(paths: LocatorPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &LocatorPaths {
        &self.paths
    }

    /// The directories visited by [`ConfigLocator::discover`], in walk order.
    pub fn search_roots(&self) -> Vec<(PathBuf, ThemeOrigin)> {
        let preset_dirs: Vec<PathBuf> = self
            .paths
            .data_dirs
            .iter()
            .flat_map(|dir| [dir.join("presets"), dir.join("fastfetch").join("presets")])
            .collect();

        let mut roots: Vec<(PathBuf, ThemeOrigin)> = preset_dirs
            .iter()
            .map(|dir| (dir.clone(), ThemeOrigin::System))
            .collect();
        roots.extend(
            preset_dirs
                .iter()
                .map(|dir| (dir.join("examples"), ThemeOrigin::Example)),
        );
        if let Some(user) = &self.paths.user_themes_dir {
            roots.push((user.clone(), ThemeOrigin::User));
        }
        roots
    }

    /// Copies `source` into the user theme directory.
    ///
    /// The stored file is named `name` (or the source's stem) and keeps the
    /// source's extension when it is a theme extension, `.jsonc` otherwise.
    /// An existing user theme of the same name is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError`] if the name is unusable, the source is not a
    /// file, or copying fails.
    pub fn install_user_theme(
        &self,
        source: &Path,
        name: Option<&str>,
    ) -> Result<ThemeDescriptor, InstallError> {
        let dir = self.paths.user_themes_dir.as_ref().ok_or(InstallError::NoUserDir)?;
        if !source.is_file() {
            return Err(InstallError::NotAFile(source.to_path_buf()));
        }

        let name = match name {
            Some(name) => name.to_string(),
            None => source
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default()
                .to_string(),
        };
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(InstallError::InvalidName(name));
        }

        let extension = if is_theme_file(source) {
            source.extension().and_then(|ext| ext.to_str()).unwrap_or("jsonc")
        } else {
            "jsonc"
        };
        let target = dir.join(format!("{name}.{extension}"));

        fs::create_dir_all(dir).map_err(|source| InstallError::Io {
            path: dir.clone(),
            source,
        })?;
        fs::copy(source, &target).map_err(|source| InstallError::Io {
            path: target.clone(),
            source,
        })?;
        info!(theme = %name, path = %target.display(), "user theme installed");

        Ok(ThemeDescriptor::new(name, target, ThemeOrigin::User))
    }
}

/// Theme files directly inside `dir`, sorted by file name.
fn scan_dir(dir: &Path, origin: ThemeOrigin) -> Vec<ThemeDescriptor> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            trace!(dir = %dir.display(), error = %err, "search root skipped");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_theme_file(path))
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    files
        .iter()
        .filter_map(|path| ThemeDescriptor::from_path(path, origin))
        .collect()
}

impl ConfigLocator for FsConfigLocator {
    fn locate(&self) -> Result<PathBuf, ApplyError> {
        if let Some(path) = &self.paths.active_override {
            if path.is_absolute() {
                return Ok(path.clone());
            }
            let cwd = std::env::current_dir().map_err(|err| ApplyError::io(path, err))?;
            return Ok(cwd.join(path));
        }

        let dir = self
            .paths
            .config_home
            .as_ref()
            .map(|home| home.join("fastfetch"))
            .ok_or_else(|| {
                ApplyError::not_found(
                    "active configuration",
                    "neither XDG_CONFIG_HOME nor HOME is set",
                )
            })?;

        let existing = ACTIVE_FILE_NAMES
            .iter()
            .map(|file| dir.join(file))
            .find(|path| path.is_file());
        match existing {
            Some(path) => Ok(path),
            None => {
                let path = dir.join(ACTIVE_FILE_NAMES[0]);
                debug!(path = %path.display(), "no active configuration yet; using default path");
                Ok(path)
            }
        }
    }

    fn discover(&self, origin: Option<ThemeOrigin>) -> Vec<ThemeDescriptor> {
        let candidates: Vec<ThemeDescriptor> = self
            .search_roots()
            .iter()
            .flat_map(|(dir, root_origin)| scan_dir(dir, *root_origin))
            .collect();
        let found = candidates.len();

        let themes: Vec<ThemeDescriptor> = dedup_by_precedence(candidates)
            .into_iter()
            .filter(|theme| origin.map_or(true, |wanted| theme.origin == wanted))
            .collect();
        debug!(found, listed = themes.len(), ?origin, "themes discovered");
        themes
    }

    fn describe_file(&self, path: &Path) -> Option<ThemeDescriptor> {
        if !path.is_file() {
            return None;
        }
        let name = path.file_stem()?.to_str()?;
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().ok()?.join(path)
        };
        Some(ThemeDescriptor::new(name, path, ThemeOrigin::User))
    }

    fn read_theme(&self, theme: &ThemeDescriptor) -> Result<Vec<u8>, ApplyError> {
        fs::read(&theme.source_path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => {
                ApplyError::not_found("theme", theme.source_path.display().to_string())
            }
            _ => ApplyError::io(&theme.source_path, err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Layout: one system data dir with presets and examples, one user dir.
    fn fixture() -> (TempDir, FsConfigLocator) {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("share/fastfetch");
        let user = tmp.path().join("home/.local/share/fastfetch/themes");

        touch(&data.join("presets/neofetch.jsonc"), "{}");
        touch(&data.join("presets/all.jsonc"), "{}");
        touch(&data.join("presets/README.md"), "not a theme");
        touch(&data.join("presets/examples/1.jsonc"), "{}");
        touch(&data.join("presets/examples/neofetch.jsonc"), "{\"example\":true}");
        touch(&user.join("all.jsonc"), "{\"user\":true}");
        touch(&user.join("mine.json"), "{}");

        let locator = FsConfigLocator::new(LocatorPaths {
            active_override: None,
            config_home: Some(tmp.path().join("home/.config")),
            data_dirs: vec![data, tmp.path().join("missing")],
            user_themes_dir: Some(user),
        });
        (tmp, locator)
    }

    // ── locate ────────────────────────────────────────────────────────────────

    #[test]
    fn test_locate_synthesizes_default_path_when_absent() {
        let (tmp, locator) = fixture();
        let path = locator.locate().unwrap();
        assert_eq!(path, tmp.path().join("home/.config/fastfetch/config.jsonc"));
        assert!(!path.exists());
    }

    #[test]
    fn test_locate_prefers_existing_json_over_synthesized_jsonc() {
        let (tmp, locator) = fixture();
        let json = tmp.path().join("home/.config/fastfetch/config.json");
        touch(&json, "{}");

        assert_eq!(locator.locate().unwrap(), json);

        let jsonc = tmp.path().join("home/.config/fastfetch/config.jsonc");
        touch(&jsonc, "{}");
        assert_eq!(locator.locate().unwrap(), jsonc, "config.jsonc wins when both exist");
    }

    #[test]
    fn test_locate_honours_override() {
        let locator = FsConfigLocator::new(LocatorPaths {
            active_override: Some(PathBuf::from("/etc/ff/custom.jsonc")),
            ..LocatorPaths::default()
        });
        assert_eq!(locator.locate().unwrap(), Path::new("/etc/ff/custom.jsonc"));
    }

    #[test]
    fn test_locate_relative_override_becomes_absolute() {
        let locator = FsConfigLocator::new(LocatorPaths {
            active_override: Some(PathBuf::from("ff/config.jsonc")),
            ..LocatorPaths::default()
        });
        let path = locator.locate().unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("ff/config.jsonc"));
    }

    #[test]
    fn test_locate_without_home_is_not_found() {
        let locator = FsConfigLocator::new(LocatorPaths::default());
        assert!(matches!(locator.locate(), Err(ApplyError::NotFound { .. })));
    }

    // ── data dirs ─────────────────────────────────────────────────────────────

    #[test]
    fn test_fallback_data_dirs_include_home_checkout() {
        let dirs = fallback_data_dirs(Some(Path::new("/home/u")), Some(Path::new("/home/u/.local/share")));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/usr/share/fastfetch"),
                PathBuf::from("/usr/local/share/fastfetch"),
                PathBuf::from("/home/u/fastfetch"),
                PathBuf::from("/home/u/.local/share/fastfetch"),
            ]
        );
        assert_eq!(fallback_data_dirs(None, None).len(), 2);
    }

    // ── discover ──────────────────────────────────────────────────────────────

    #[test]
    fn test_discover_dedups_and_keeps_walk_order() {
        // Arrange
        let (_tmp, locator) = fixture();

        // Act
        let themes = locator.discover(None);

        // Assert
        let listed: Vec<String> = themes.iter().map(|t| t.qualified_name()).collect();
        assert_eq!(
            listed,
            vec!["system/neofetch", "example/1", "user/all", "user/mine"],
            "user 'all' shadows system 'all'; system 'neofetch' shadows the example"
        );
    }

    #[test]
    fn test_discover_filters_after_dedup() {
        let (_tmp, locator) = fixture();
        let examples = locator.discover(Some(ThemeOrigin::Example));
        let names: Vec<&str> = examples.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["1"], "shadowed example 'neofetch' is not listed");
    }

    #[test]
    fn test_discover_is_repeatable() {
        let (_tmp, locator) = fixture();
        assert_eq!(locator.discover(None), locator.discover(None));
    }

    #[test]
    fn test_search_roots_order() {
        let locator = FsConfigLocator::new(LocatorPaths {
            data_dirs: vec![PathBuf::from("/a"), PathBuf::from("/b")],
            user_themes_dir: Some(PathBuf::from("/u")),
            ..LocatorPaths::default()
        });
        let origins: Vec<ThemeOrigin> = locator.search_roots().into_iter().map(|(_, o)| o).collect();
        assert_eq!(origins.len(), 9);
        assert!(origins[..4].iter().all(|o| *o == ThemeOrigin::System));
        assert!(origins[4..8].iter().all(|o| *o == ThemeOrigin::Example));
        assert_eq!(origins[8], ThemeOrigin::User);
    }

    // ── read / describe / install ─────────────────────────────────────────────

    #[test]
    fn test_read_theme_vanished_is_not_found() {
        let (tmp, locator) = fixture();
        let theme = ThemeDescriptor::new("gone", tmp.path().join("gone.jsonc"), ThemeOrigin::User);
        assert!(matches!(locator.read_theme(&theme), Err(ApplyError::NotFound { .. })));
    }

    #[test]
    fn test_describe_file_accepts_any_regular_file() {
        let (tmp, locator) = fixture();
        let loose = tmp.path().join("draft.txt");
        touch(&loose, "{}");

        let theme = locator.describe_file(&loose).unwrap();
        assert_eq!(theme.name, "draft");
        assert_eq!(theme.origin, ThemeOrigin::User);
        assert!(locator.describe_file(tmp.path()).is_none(), "directories are not themes");
    }

    #[test]
    fn test_install_user_theme_copies_and_is_discovered() {
        // Arrange
        let (tmp, locator) = fixture();
        let source = tmp.path().join("downloads/cool");
        touch(&source, "{\"logo\":\"cool\"}");

        // Act
        let theme = locator.install_user_theme(&source, Some("cool-theme")).unwrap();

        // Assert
        assert_eq!(theme.source_path.file_name().unwrap(), "cool-theme.jsonc");
        assert_eq!(fs::read_to_string(&theme.source_path).unwrap(), "{\"logo\":\"cool\"}");
        assert!(locator
            .discover(Some(ThemeOrigin::User))
            .iter()
            .any(|t| t.name == "cool-theme"));
    }

    #[test]
    fn test_install_user_theme_keeps_json_extension() {
        let (tmp, locator) = fixture();
        let source = tmp.path().join("x.json");
        touch(&source, "{}");
        let theme = locator.install_user_theme(&source, None).unwrap();
        assert_eq!(theme.source_path.extension().unwrap(), "json");
        assert_eq!(theme.name, "x");
    }

    #[test]
    fn test_install_user_theme_rejects_path_names() {
        let (tmp, locator) = fixture();
        let source = tmp.path().join("x.jsonc");
        touch(&source, "{}");
        assert!(matches!(
            locator.install_user_theme(&source, Some("../escape")),
            Err(InstallError::InvalidName(_))
        ));
    }
}
