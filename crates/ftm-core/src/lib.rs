//! # ftm-core
//!
//! Shared library for ftm (the fastfetch theme manager) containing the domain
//! entities, precedence rules and the state machine of the safe-apply cycle.
//!
//! It has zero dependencies on OS APIs, subprocesses, or the file system, so
//! every rule in here can be tested without touching a real configuration.
//!
//! # Architecture overview (for beginners)
//!
//! fastfetch reads a single "active" configuration file.  Users collect many
//! alternative configurations ("themes") and want to switch between them
//! without ever ending up with a configuration that makes fastfetch fail.
//!
//! ftm solves this with an apply cycle: take a snapshot of the active file,
//! write the theme, run fastfetch once as a probe, and keep the theme only if
//! the probe succeeded.  Otherwise the snapshot is written back.
//!
//! This crate (`ftm-core`) defines the vocabulary of that cycle:
//!
//! - **`domain::theme`** – Theme descriptors, their origin (system preset,
//!   bundled example, user theme) and the precedence used when two search
//!   roots provide a theme with the same name.
//!
//! - **`domain::snapshot`** – The saved copy of the active configuration.
//!
//! - **`domain::probe`** – How one probe run is classified, plus the bounded
//!   output tail used to keep diagnostic output from growing without limit.
//!
//! - **`domain::apply`** – The apply state machine, the terminal
//!   [`ApplyResult`], and the error taxonomy.

pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `ftm_core::ThemeDescriptor` instead of `ftm_core::domain::theme::ThemeDescriptor`.
pub use domain::apply::{
    ApplyCycle, ApplyError, ApplyResult, ApplyState, ExitStatusCode, IllegalTransition,
    RestoreCheck,
};
pub use domain::probe::{OutputTail, ProbeOutcome};
pub use domain::snapshot::{Snapshot, SnapshotId};
pub use domain::theme::{
    dedup_by_precedence, is_theme_file, resolve_theme, ThemeDescriptor, ThemeOrigin,
    UnknownOrigin, THEME_EXTENSIONS,
};
