//! Storage infrastructure: settings file persistence.
//!
//! The `config` sub-module handles:
//!
//! - Reading `ftm/config.toml` from the platform-appropriate directory (or an
//!   explicit path).
//! - Providing defaults for every field when the file, a section, or a key is
//!   missing.
//! - Writing a fully populated file for `ftm settings --write`.
//!
//! The active fastfetch configuration itself is never handled here; only
//! [`crate::infrastructure::backup`] writes to it.

pub mod config;
