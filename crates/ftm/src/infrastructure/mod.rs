//! Infrastructure layer for ftm.
//!
//! Contains OS-facing adapters: file-system theme discovery, durable
//! snapshots, the fastfetch subprocess probe, settings persistence and
//! terminal rendering.
//!
//! **Dependency rule**: this layer may depend on `application` and `ftm_core`,
//! but MUST NOT be imported by the `application` or domain layers.

pub mod backup;
pub mod console;
pub mod context;
pub mod dirs;
pub mod locator;
pub mod probe;
pub mod storage;
