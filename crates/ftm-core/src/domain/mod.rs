//! Domain entities for ftm.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code:
//!
//! - Contains the core rules of the application.
//! - Has **no** imports from OS APIs, process spawning, or file-system access.
//! - Can be compiled and tested on any platform without any external setup.
//!
//! Code in outer layers (application, infrastructure, CLI) depends on the
//! domain, but the domain never depends on them.

/// The apply state machine, its terminal result, and the error taxonomy.
pub mod apply;

/// Classification of a single probe run.
pub mod probe;

/// The saved copy of the active configuration.
pub mod snapshot;

/// Theme descriptors and their precedence rules.
pub mod theme;
