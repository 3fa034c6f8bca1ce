//! Terminal rendering for the CLI.
//!
//! Every function returns a `String`; `main` decides whether it goes to stdout
//! or stderr.  Listings go to stdout so they can be piped, diagnostics go to
//! stderr.
//!
//! # Data Transfer Objects
//!
//! `ftm list --json` emits [`ThemeRow`] values rather than the domain
//! [`ThemeDescriptor`], so the JSON shape stays stable even if the domain type
//! grows fields.

use std::fmt::Write as _;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ftm_core::{ApplyResult, RestoreCheck, ThemeDescriptor};
use serde::Serialize;

use super::backup::SnapshotEntry;

/// One row of `ftm list --json`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ThemeRow {
    pub index: usize,
    pub name: String,
    pub origin: String,
    pub path: String,
}

impl ThemeRow {
    fn from_descriptor(index: usize, theme: &ThemeDescriptor) -> Self {
        Self {
            index,
            name: theme.name.clone(),
            origin: theme.origin.to_string(),
            path: theme.source_path.display().to_string(),
        }
    }
}

/// Numbered table of themes; the index is what `ftm apply <n>` accepts.
pub fn theme_table(themes: &[ThemeDescriptor]) -> String {
    if themes.is_empty() {
        return "no themes found\n".to_string();
    }

    let name_width = themes
        .iter()
        .map(|t| t.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let index_width = (themes.len() - 1).to_string().len().max(1);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>iw$}  {:<nw$}  {:<7}  PATH",
        "#",
        "NAME",
        "ORIGIN",
        iw = index_width,
        nw = name_width
    );
    for (i, theme) in themes.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>iw$}  {:<nw$}  {:<7}  {}",
            i,
            theme.name,
            theme.origin.as_str(),
            theme.source_path.display(),
            iw = index_width,
            nw = name_width
        );
    }
    out
}

/// JSON array of [`ThemeRow`]s.
///
/// # Errors
///
/// Propagates serialization errors from `serde_json`.
pub fn theme_json(themes: &[ThemeDescriptor]) -> serde_json::Result<String> {
    let rows: Vec<ThemeRow> = themes
        .iter()
        .enumerate()
        .map(|(i, t)| ThemeRow::from_descriptor(i, t))
        .collect();
    serde_json::to_string_pretty(&rows)
}

/// Table of retained snapshots, newest first.
pub fn backup_table(entries: &[SnapshotEntry], now: SystemTime) -> String {
    if entries.is_empty() {
        return "no snapshots retained\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:<8}  {:>9}  {:>8}  ORIGINAL PATH", "ID", "AGE", "SIZE");
    for entry in entries {
        let record = &entry.record;
        let taken = UNIX_EPOCH + Duration::from_millis(record.taken_at_ms);
        let age = now.duration_since(taken).unwrap_or_default();
        let size = if record.existed {
            format!("{} B", record.size)
        } else {
            "(absent)".to_string()
        };
        let id = record.id.simple().to_string();
        let _ = writeln!(
            out,
            "{:<8}  {:>9}  {:>8}  {}",
            &id[..8],
            human_age(age),
            size,
            record.origin_path.display()
        );
    }
    out
}

fn human_age(age: Duration) -> String {
    let secs = age.as_secs();
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

/// Human-readable report of an apply cycle.
pub fn apply_report(result: &ApplyResult) -> String {
    let mut out = match result {
        ApplyResult::Applied { .. } => format!("✔ {result}"),
        ApplyResult::RevertedCrash { .. } | ApplyResult::RevertedTimeout { .. } => {
            format!("↺ {result}")
        }
        ApplyResult::CriticalFailure { .. } => format!("✘ CRITICAL: {result}"),
        ApplyResult::Failed(_) => format!("✘ {result}"),
    };

    let check = match result {
        ApplyResult::RevertedCrash { restore_check, .. }
        | ApplyResult::RevertedTimeout { restore_check, .. } => Some(restore_check),
        _ => None,
    };
    match check {
        Some(RestoreCheck::Verified) => out.push_str("\n  restored configuration verified"),
        Some(RestoreCheck::StillFailing(reason)) => {
            let _ = write!(
                out,
                "\n  warning: the restored configuration fails as well ({reason}); \
                 it was already broken before this apply"
            );
        }
        Some(RestoreCheck::Trusted) | None => {}
    }
    out.push('\n');
    out
}
