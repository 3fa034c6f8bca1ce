//! The safe-apply state machine and its terminal result.
//!
//! # Apply lifecycle (for beginners)
//!
//! Every apply attempt walks through these states:
//!
//! ```text
//!          ┌──────────► Failed            (nothing was mutated)
//!          │
//! Idle ──► Snapshotting ──► Probing ──► Committed ──► Applied
//!                              │
//!                              └──► RollingBack ──► Reverted
//!                                        │
//!                                        └──► CriticalFailure
//! ```
//!
//! - `Snapshotting`: the active configuration is copied to the backup store.
//!   If that fails the cycle ends in `Failed` and the active file is untouched.
//! - `Probing`: the candidate has been written and the display program is
//!   running against it.
//! - `Committed`: the probe succeeded; the candidate stays.
//! - `RollingBack`: the probe crashed or timed out; the snapshot is being
//!   written back.
//! - `CriticalFailure`: writing the snapshot back failed.  This is the only
//!   state that needs the user to recover by hand.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// States of one apply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyState {
    Idle,
    Snapshotting,
    Probing,
    Committed,
    RollingBack,
    Applied,
    Reverted,
    CriticalFailure,
    Failed,
}

impl ApplyState {
    /// Returns `true` if moving from `self` to `next` is a legal step.
    pub fn can_transition_to(self, next: ApplyState) -> bool {
        use ApplyState::*;
        matches!(
            (self, next),
            (Idle, Snapshotting)
                | (Idle, Failed)
                | (Snapshotting, Probing)
                | (Snapshotting, Failed)
                | (Probing, Committed)
                | (Probing, RollingBack)
                | (Committed, Applied)
                | (RollingBack, Reverted)
                | (RollingBack, CriticalFailure)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplyState::Applied
                | ApplyState::Reverted
                | ApplyState::CriticalFailure
                | ApplyState::Failed
        )
    }
}

/// Returned when a cycle is asked to take a step the state machine forbids.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("illegal apply transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: ApplyState,
    pub to: ApplyState,
}

/// Tracks the state of one apply cycle and the path it took.
#[derive(Debug, Clone)]
pub struct ApplyCycle {
    state: ApplyState,
    history: Vec<ApplyState>,
}

impl ApplyCycle {
    pub fn new() -> Self {
        Self {
            state: ApplyState::Idle,
            history: vec![ApplyState::Idle],
        }
    }

    pub fn state(&self) -> ApplyState {
        self.state
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn history(&self) -> &[ApplyState] {
        &self.history
    }

    /// Moves to `next` if the transition is legal.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] and leaves the state unchanged otherwise.
    pub fn advance(&mut self, next: ApplyState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = ?self.state, to = ?next, "apply state transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}

impl Default for ApplyCycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that end an apply cycle before the active configuration is touched.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The active configuration, the theme, or the probe program could not be located.
    #[error("{what} not found: {detail}")]
    NotFound { what: &'static str, detail: String },

    /// Reading the theme or snapshotting the active configuration failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another apply is already in flight for the same active configuration.
    #[error("an apply is already in progress for {}", path.display())]
    Busy { path: PathBuf },

    /// The engine attempted a transition the state machine forbids.
    #[error(transparent)]
    Internal(#[from] IllegalTransition),
}

impl ApplyError {
    pub fn not_found(what: &'static str, detail: impl Into<String>) -> Self {
        ApplyError::NotFound {
            what,
            detail: detail.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ApplyError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Whether the content written back during a rollback was probed again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreCheck {
    /// Not re-probed; the previous content is assumed to have been good.
    Trusted,
    /// Re-probed and the probe succeeded.
    Verified,
    /// Re-probed and the probe failed: the previous content was already broken.
    StillFailing(String),
}

/// Process exit status reported for each kind of result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatusCode {
    Applied = 0,
    Failed = 1,
    Reverted = 3,
    CriticalFailure = 4,
}

impl ExitStatusCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Terminal outcome of one apply cycle.
#[derive(Debug)]
pub enum ApplyResult {
    /// The theme passed the probe and is now the active configuration.
    Applied { theme: String },
    /// The probe failed; the previous configuration was restored.
    RevertedCrash {
        theme: String,
        reason: String,
        restore_check: RestoreCheck,
    },
    /// The probe timed out; the previous configuration was restored.
    RevertedTimeout {
        theme: String,
        restore_check: RestoreCheck,
    },
    /// The theme was rejected and restoring the previous configuration failed.
    ///
    /// The active configuration may still hold the candidate theme.  The
    /// previous content is available at `snapshot_location`.
    CriticalFailure {
        theme: String,
        reason: String,
        restore_error: String,
        snapshot_location: Option<PathBuf>,
    },
    /// The cycle stopped before the active configuration was mutated.
    Failed(ApplyError),
}

impl ApplyResult {
    pub fn exit_code(&self) -> ExitStatusCode {
        match self {
            ApplyResult::Applied { .. } => ExitStatusCode::Applied,
            ApplyResult::RevertedCrash { .. } | ApplyResult::RevertedTimeout { .. } => {
                ExitStatusCode::Reverted
            }
            ApplyResult::CriticalFailure { .. } => ExitStatusCode::CriticalFailure,
            ApplyResult::Failed(_) => ExitStatusCode::Failed,
        }
    }

    /// Name of the theme the cycle was about, if it got that far.
    pub fn theme(&self) -> Option<&str> {
        match self {
            ApplyResult::Applied { theme }
            | ApplyResult::RevertedCrash { theme, .. }
            | ApplyResult::RevertedTimeout { theme, .. }
            | ApplyResult::CriticalFailure { theme, .. } => Some(theme),
            ApplyResult::Failed(_) => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyResult::Applied { .. })
    }

    pub fn is_reverted(&self) -> bool {
        matches!(
            self,
            ApplyResult::RevertedCrash { .. } | ApplyResult::RevertedTimeout { .. }
        )
    }

    /// The terminal [`ApplyState`] this result corresponds to.
    pub fn terminal_state(&self) -> ApplyState {
        match self {
            ApplyResult::Applied { .. } => ApplyState::Applied,
            ApplyResult::RevertedCrash { .. } | ApplyResult::RevertedTimeout { .. } => {
                ApplyState::Reverted
            }
            ApplyResult::CriticalFailure { .. } => ApplyState::CriticalFailure,
            ApplyResult::Failed(_) => ApplyState::Failed,
        }
    }
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyResult::Applied { theme } => write!(f, "applied theme '{theme}'"),
            ApplyResult::RevertedCrash { theme, reason, .. } => write!(
                f,
                "theme '{theme}' rejected ({reason}); previous configuration restored"
            ),
            ApplyResult::RevertedTimeout { theme, .. } => write!(
                f,
                "theme '{theme}' rejected (probe timed out); previous configuration restored"
            ),
            ApplyResult::CriticalFailure {
                theme,
                reason,
                restore_error,
                snapshot_location,
            } => {
                write!(
                    f,
                    "theme '{theme}' rejected ({reason}) and the previous configuration \
                     could NOT be restored: {restore_error}"
                )?;
                match snapshot_location {
                    Some(loc) => write!(f, "; recover it manually from {}", loc.display()),
                    None => f.write_str("; no durable copy of the previous configuration exists"),
                }
            }
            ApplyResult::Failed(err) => write!(f, "apply failed: {err}"),
        }
    }
}
