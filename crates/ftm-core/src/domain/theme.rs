//! Theme descriptor domain entity.
//!
//! A theme is any fastfetch configuration file found in one of the search
//! roots.  Three kinds of roots exist, and each gives its themes an
//! [`ThemeOrigin`]:
//!
//! ```text
//! <data_dir>/presets/*.jsonc            -> System   (presets shipped with fastfetch)
//! <data_dir>/presets/examples/*.jsonc   -> Example  (bundled example configs)
//! <user_themes_dir>/*.jsonc             -> User     (themes added by the user)
//! ```
//!
//! Two roots may provide a theme with the same name.  The listing only keeps
//! one of them, chosen by [`ThemeOrigin::precedence`]: User overrides System,
//! System overrides Example.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File extensions recognised as theme files (compared case-insensitively).
pub const THEME_EXTENSIONS: &[&str] = &["jsonc", "json"];

/// Where a theme was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeOrigin {
    /// A preset shipped with fastfetch itself.
    System,
    /// A bundled example configuration.
    Example,
    /// A theme the user added to their own theme directory.
    User,
}

impl ThemeOrigin {
    /// All origins in search-root walk order.
    pub const ALL: [ThemeOrigin; 3] = [ThemeOrigin::System, ThemeOrigin::Example, ThemeOrigin::User];

    /// Rank used to break name collisions; the higher rank wins.
    pub fn precedence(self) -> u8 {
        match self {
            ThemeOrigin::Example => 0,
            ThemeOrigin::System => 1,
            ThemeOrigin::User => 2,
        }
    }

    /// Lower-case label used in listings and qualified names.
    pub fn as_str(self) -> &'static str {
        match self {
            ThemeOrigin::System => "system",
            ThemeOrigin::Example => "example",
            ThemeOrigin::User => "user",
        }
    }
}

impl fmt::Display for ThemeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an origin label cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown theme origin '{0}' (expected system, example or user)")]
pub struct UnknownOrigin(pub String);

impl FromStr for ThemeOrigin {
    type Err = UnknownOrigin;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" | "builtin" | "builtins" => Ok(ThemeOrigin::System),
            "example" | "examples" => Ok(ThemeOrigin::Example),
            "user" => Ok(ThemeOrigin::User),
            _ => Err(UnknownOrigin(s.to_string())),
        }
    }
}

/// A candidate configuration file that can become the active configuration.
///
/// Descriptors are immutable and only live for one discovery pass; every
/// command invocation re-scans the search roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeDescriptor {
    /// File stem of the theme, unique within one listing.
    pub name: String,
    /// Absolute path of the theme file.
    pub source_path: PathBuf,
    /// Which search root provided the theme.
    pub origin: ThemeOrigin,
}

impl ThemeDescriptor {
    pub fn new(name: impl Into<String>, source_path: impl Into<PathBuf>, origin: ThemeOrigin) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            origin,
        }
    }

    /// Builds a descriptor from a file path, using the file stem as the name.
    ///
    /// Returns `None` when the path does not carry a recognised theme extension.
    pub fn from_path(path: &Path, origin: ThemeOrigin) -> Option<Self> {
        if !is_theme_file(path) {
            return None;
        }
        let name = path.file_stem()?.to_str()?.to_string();
        Some(Self::new(name, path, origin))
    }

    /// `origin/name`, e.g. `user/dracula`.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.origin, self.name)
    }
}

/// Returns `true` if `path` has one of the [`THEME_EXTENSIONS`].
pub fn is_theme_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            THEME_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Removes name collisions from `candidates`, keeping one descriptor per name.
///
/// The descriptor with the highest [`ThemeOrigin::precedence`] wins.  Among
/// descriptors of equal precedence the first one wins.  Survivors keep their
/// relative order from `candidates`.
pub fn dedup_by_precedence(candidates: Vec<ThemeDescriptor>) -> Vec<ThemeDescriptor> {
    let mut winners: HashMap<&str, usize> = HashMap::with_capacity(candidates.len());

    for (idx, candidate) in candidates.iter().enumerate() {
        match winners.get(candidate.name.as_str()) {
            Some(&current)
                if candidates[current].origin.precedence() >= candidate.origin.precedence() => {}
            _ => {
                winners.insert(candidate.name.as_str(), idx);
            }
        }
    }

    let mut keep = vec![false; candidates.len()];
    for idx in winners.into_values() {
        keep[idx] = true;
    }

    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(candidate, keep)| keep.then_some(candidate))
        .collect()
}

/// Looks up a theme in a listing by index, exact name, or `origin/name`.
///
/// Numeric arguments are tried as an index first, so a theme literally named
/// `3` is only reachable through its qualified name.
pub fn resolve_theme<'a>(arg: &str, themes: &'a [ThemeDescriptor]) -> Option<&'a ThemeDescriptor> {
    if let Ok(idx) = arg.parse::<usize>() {
        if let Some(theme) = themes.get(idx) {
            return Some(theme);
        }
    }

    if let Some(theme) = themes.iter().find(|t| t.name == arg) {
        return Some(theme);
    }

    let (origin, name) = arg.split_once('/')?;
    let origin = origin.parse::<ThemeOrigin>().ok()?;
    themes.iter().find(|t| t.origin == origin && t.name == name)
}
