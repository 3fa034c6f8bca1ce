//! SafeApplyEngine: try a theme, keep it if fastfetch still runs, revert if not.
//!
//! This use case is the heart of ftm and the only code path that writes the
//! active configuration.  One call to [`SafeApplyEngine::apply`] runs one
//! cycle of the state machine defined in [`ftm_core::domain::apply`]:
//!
//! ```text
//! locate ─► read theme ─► snapshot ─► commit ─► probe ─┬─► Applied
//!                                                      └─► restore ─┬─► Reverted
//!                                                                   └─► CriticalFailure
//! ```
//!
//! Ordering is strict: the snapshot is durable before the commit, the commit
//! finishes before the probe starts, and the restore finishes before a
//! `Reverted` result is returned.  Any failure before the commit ends the
//! cycle as `Failed` with the active configuration untouched.
//!
//! # Architecture
//!
//! The engine depends only on the traits in [`super::ports`].  All
//! infrastructure implementations are injected at construction time, making
//! the use case fully unit-testable.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ftm_core::{
    ApplyCycle, ApplyError, ApplyResult, ApplyState, ProbeOutcome, RestoreCheck, Snapshot,
    ThemeDescriptor,
};
use tracing::{debug, error, info, warn, Instrument};

use super::ports::{BackupStore, ConfigLocator, ProcessProbe};

/// Probe timeout used when none is configured.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for an apply cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    /// How long the probe may run before it is killed and counted as a timeout.
    pub timeout: Duration,
    /// Re-probe the restored content after a rollback.
    pub verify_restored: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
            verify_restored: false,
        }
    }
}

/// Configuration paths with an apply cycle in flight.
type InFlight = Arc<Mutex<HashSet<PathBuf>>>;

/// Marks a configuration path as being written for the lifetime of the guard.
struct InFlightGuard {
    registry: InFlight,
    path: PathBuf,
}

impl InFlightGuard {
    fn acquire(registry: &InFlight, path: &Path) -> Result<Self, ApplyError> {
        let mut active = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(path.to_path_buf()) {
            return Err(ApplyError::Busy {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            registry: Arc::clone(registry),
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

/// Everything gathered before the first write.
struct Prepared {
    config_path: PathBuf,
    candidate: Vec<u8>,
    snapshot: Snapshot,
    _guard: InFlightGuard,
}

/// Why a candidate was rejected after it had been written.
enum Rejection {
    Crash(String),
    Timeout,
}

impl Rejection {
    fn reason(&self) -> String {
        match self {
            Rejection::Crash(reason) => reason.clone(),
            Rejection::Timeout => ProbeOutcome::Timeout.to_string(),
        }
    }
}

/// Orchestrates locator, backup store and probe into one safe apply cycle.
///
/// Clones share the in-flight registry, so at most one cycle per active
/// configuration runs across all clones; a concurrent call gets
/// [`ApplyError::Busy`] instead of interleaving writes.
#[derive(Clone)]
pub struct SafeApplyEngine {
    locator: Arc<dyn ConfigLocator>,
    store: Arc<dyn BackupStore>,
    probe: Arc<dyn ProcessProbe>,
    options: ApplyOptions,
    in_flight: InFlight,
}

impl SafeApplyEngine {
    /// Creates a new engine.
    pub fn new(
        locator: Arc<dyn ConfigLocator>,
        store: Arc<dyn BackupStore>,
        probe: Arc<dyn ProcessProbe>,
        options: ApplyOptions,
    ) -> Self {
        Self {
            locator,
            store,
            probe,
            options,
            in_flight: Arc::default(),
        }
    }

    pub fn options(&self) -> &ApplyOptions {
        &self.options
    }

    /// Returns a copy of this engine with a different probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Runs one full apply cycle for `theme`.
    ///
    /// Applying the theme that is already active still runs the full cycle;
    /// the probe is the only source of truth about whether it still works.
    pub async fn apply(&self, theme: &ThemeDescriptor) -> ApplyResult {
        let span = tracing::info_span!("apply", theme = %theme.name, origin = %theme.origin);
        async {
            let mut cycle = ApplyCycle::new();
            let result = match self.prepare(theme, &mut cycle) {
                Ok(prepared) => self.commit_and_probe(theme, prepared, &mut cycle).await,
                Err(err) => {
                    warn!(error = %err, "apply aborted before any write");
                    record(&mut cycle, ApplyState::Failed);
                    ApplyResult::Failed(err)
                }
            };
            debug!(path = ?cycle.history(), "apply cycle finished");
            result
        }
        .instrument(span)
        .await
    }

    /// Idle → Snapshotting: everything that can fail without a write.
    fn prepare(&self, theme: &ThemeDescriptor, cycle: &mut ApplyCycle) -> Result<Prepared, ApplyError> {
        let config_path = self.locator.locate()?;
        let guard = InFlightGuard::acquire(&self.in_flight, &config_path)?;

        // Read the candidate before snapshotting: snapshot pruning may remove
        // the very file being applied when it is itself a retained snapshot.
        let candidate = self.locator.read_theme(theme)?;
        self.probe.ensure_available()?;

        cycle.advance(ApplyState::Snapshotting)?;
        let snapshot = self.store.snapshot(&config_path)?;
        debug!(
            config = %config_path.display(),
            snapshot = %snapshot.id,
            bytes = snapshot.payload.len(),
            existed = snapshot.existed,
            "active configuration snapshotted"
        );

        Ok(Prepared {
            config_path,
            candidate,
            snapshot,
            _guard: guard,
        })
    }

    /// Snapshotting → Probing → {Committed, RollingBack}.
    async fn commit_and_probe(
        &self,
        theme: &ThemeDescriptor,
        prepared: Prepared,
        cycle: &mut ApplyCycle,
    ) -> ApplyResult {
        if let Err(err) = step(cycle, ApplyState::Probing) {
            record(cycle, ApplyState::Failed);
            return ApplyResult::Failed(err);
        }

        let outcome = match self
            .store
            .commit(&prepared.snapshot, &prepared.config_path, &prepared.candidate)
        {
            Ok(()) => self.probe.run(&prepared.config_path, self.options.timeout).await,
            Err(err) => {
                // A failed write may have left partial content behind.
                warn!(error = %err, "writing the candidate failed; rolling back");
                return self
                    .roll_back(
                        theme,
                        &prepared,
                        Rejection::Crash(format!("could not write candidate: {err}")),
                        cycle,
                    )
                    .await;
            }
        };

        match outcome {
            ProbeOutcome::Success { .. } => {
                record(cycle, ApplyState::Committed);
                record(cycle, ApplyState::Applied);
                info!(config = %prepared.config_path.display(), "theme applied");
                ApplyResult::Applied {
                    theme: theme.name.clone(),
                }
            }
            ProbeOutcome::Timeout => {
                warn!(timeout_ms = self.options.timeout.as_millis() as u64, "probe timed out");
                self.roll_back(theme, &prepared, Rejection::Timeout, cycle).await
            }
            crash @ ProbeOutcome::Crash { .. } => {
                warn!(outcome = %crash, "probe failed");
                self.roll_back(theme, &prepared, Rejection::Crash(crash.to_string()), cycle)
                    .await
            }
        }
    }

    /// RollingBack → {Reverted, CriticalFailure}.
    async fn roll_back(
        &self,
        theme: &ThemeDescriptor,
        prepared: &Prepared,
        rejection: Rejection,
        cycle: &mut ApplyCycle,
    ) -> ApplyResult {
        record(cycle, ApplyState::RollingBack);

        if let Err(err) = self.store.restore(&prepared.snapshot, &prepared.config_path) {
            record(cycle, ApplyState::CriticalFailure);
            error!(
                error = %err,
                config = %prepared.config_path.display(),
                snapshot = ?prepared.snapshot.location,
                "restoring the previous configuration failed; manual recovery required"
            );
            return ApplyResult::CriticalFailure {
                theme: theme.name.clone(),
                reason: rejection.reason(),
                restore_error: err.to_string(),
                snapshot_location: prepared.snapshot.location.clone(),
            };
        }

        let restore_check = self.check_restored(prepared).await;
        record(cycle, ApplyState::Reverted);
        info!(?restore_check, "previous configuration restored");

        match rejection {
            Rejection::Crash(reason) => ApplyResult::RevertedCrash {
                theme: theme.name.clone(),
                reason,
                restore_check,
            },
            Rejection::Timeout => ApplyResult::RevertedTimeout {
                theme: theme.name.clone(),
                restore_check,
            },
        }
    }

    /// Optionally probes the content that was just written back.
    async fn check_restored(&self, prepared: &Prepared) -> RestoreCheck {
        // Nothing to probe when the rollback removed a configuration that never existed.
        if !self.options.verify_restored || !prepared.snapshot.existed {
            return RestoreCheck::Trusted;
        }
        match self.probe.run(&prepared.config_path, self.options.timeout).await {
            ProbeOutcome::Success { .. } => RestoreCheck::Verified,
            failed => {
                warn!(outcome = %failed, "restored configuration fails the probe as well");
                RestoreCheck::StillFailing(failed.to_string())
            }
        }
    }
}

/// Advances `cycle`.  An illegal step is logged and returned as
/// [`ApplyError::Internal`].
fn step(cycle: &mut ApplyCycle, next: ApplyState) -> Result<(), ApplyError> {
    cycle.advance(next).map_err(|err| {
        error!(error = %err, "apply state machine violated");
        ApplyError::from(err)
    })
}

/// Advances `cycle` once the active configuration has been written.  The
/// result must then describe what is on disk, so an illegal step is only
/// logged.
fn record(cycle: &mut ApplyCycle, next: ApplyState) {
    let _ = step(cycle, next);
}
