//! XDG base directories.
//!
//! fastfetch follows the XDG layout on every Unix-like platform, including
//! macOS, so these helpers do too.  Empty variables are treated as unset.

use std::env;
use std::path::PathBuf;

fn var_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// The user's home directory (`$HOME`, or `%USERPROFILE%` on Windows).
pub fn home_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        var_path("USERPROFILE").or_else(|| var_path("HOME"))
    }

    #[cfg(not(windows))]
    {
        var_path("HOME")
    }
}

/// `$XDG_CONFIG_HOME`, or `~/.config`.
pub fn config_home() -> Option<PathBuf> {
    var_path("XDG_CONFIG_HOME").or_else(|| home_dir().map(|home| home.join(".config")))
}

/// `$XDG_DATA_HOME`, or `~/.local/share`.
pub fn data_home() -> Option<PathBuf> {
    var_path("XDG_DATA_HOME").or_else(|| home_dir().map(|home| home.join(".local").join("share")))
}
