//! Theme catalog use case: listing themes and resolving a theme argument.

use std::path::Path;
use std::sync::Arc;

use ftm_core::{resolve_theme, ThemeDescriptor, ThemeOrigin};
use thiserror::Error;
use tracing::debug;

use super::ports::ConfigLocator;

/// Errors from catalog lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("no theme matches '{0}' (try `ftm list`)")]
    UnknownTheme(String),
}

/// Read-only view over the themes the locator can find.
pub struct ThemeCatalog {
    locator: Arc<dyn ConfigLocator>,
}

impl ThemeCatalog {
    pub fn new(locator: Arc<dyn ConfigLocator>) -> Self {
        Self { locator }
    }

    /// Lists themes in walk order, optionally restricted to one origin.
    ///
    /// The listing is re-scanned on every call.
    pub fn list(&self, origin: Option<ThemeOrigin>) -> Vec<ThemeDescriptor> {
        self.locator.discover(origin)
    }

    /// Resolves a user-supplied theme argument.
    ///
    /// Tried in order: index into the full listing, exact name, qualified
    /// `origin/name`, and finally a path to an existing file, which becomes an
    /// ad-hoc user theme.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownTheme`] when nothing matches.
    pub fn resolve(&self, arg: &str) -> Result<ThemeDescriptor, CatalogError> {
        let themes = self.list(None);
        if let Some(theme) = resolve_theme(arg, &themes) {
            debug!(arg, theme = %theme.qualified_name(), "theme resolved from listing");
            return Ok(theme.clone());
        }

        match self.locator.describe_file(Path::new(arg)) {
            Some(theme) => {
                debug!(arg, path = %theme.source_path.display(), "theme resolved from file");
                Ok(theme)
            }
            None => Err(CatalogError::UnknownTheme(arg.to_string())),
        }
    }
}
