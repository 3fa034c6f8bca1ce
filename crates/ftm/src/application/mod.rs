//! Application layer use cases for ftm.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `ftm-core`) and the infrastructure (file system, processes).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a user goal (e.g., "make this
//!   theme the active configuration, but only if fastfetch still runs").
//! - **Depend on abstractions** (the traits in [`ports`]) rather than concrete
//!   implementations, so tests can swap in fakes that fail on demand.
//! - **Contain no OS calls, no process spawning, no file system access**.
//!
//! # Sub-modules
//!
//! - **`ports`**      – The `ConfigLocator`, `BackupStore` and `ProcessProbe`
//!   traits the use cases are written against.
//!
//! - **`safe_apply`** – The snapshot → commit → probe → rollback cycle.  This
//!   is the only use case that mutates the active configuration.
//!
//! - **`catalog`**    – Listing themes and resolving a user's theme argument
//!   (index, name, qualified name or file path) to a descriptor.

pub mod catalog;
pub mod ports;
pub mod safe_apply;
