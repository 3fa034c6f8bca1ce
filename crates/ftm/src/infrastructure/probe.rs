//! Subprocess [`ProcessProbe`] built on `tokio::process`.
//!
//! The probed program runs with stdin closed and both output streams piped.
//! Each stream is drained on its own task into an [`OutputTail`], so a chatty
//! program can neither block on a full pipe nor grow memory without bound.
//!
//! On Unix the child is started in its own process group.  When the timeout
//! elapses the whole group is killed with `SIGKILL` and the child is reaped
//! before the probe returns, so nothing it spawned outlives the probe.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use ftm_core::{ApplyError, OutputTail, ProbeOutcome};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::ports::ProcessProbe;

/// Replaced by the configuration path in probe arguments.
pub const CONFIG_PLACEHOLDER: &str = "{config}";

/// Lines of output kept per stream when not configured otherwise.
pub const DEFAULT_TAIL_LINES: usize = 20;

/// Asks fastfetch where its data directories are, one per line.
pub const LIST_DATA_PATHS_FLAG: &str = "--list-data-paths";

/// How long to wait for the output readers once the child has exited.
const TAIL_GRACE: Duration = Duration::from_millis(500);

/// Program and argument template used to probe a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    pub program: String,
    /// Arguments; occurrences of [`CONFIG_PLACEHOLDER`] are substituted.
    /// Without a placeholder the program is expected to read its standard
    /// configuration location.
    pub args: Vec<String>,
}

impl Default for ProbeCommand {
    fn default() -> Self {
        Self {
            program: "fastfetch".to_string(),
            args: vec!["--config".to_string(), CONFIG_PLACEHOLDER.to_string()],
        }
    }
}

impl ProbeCommand {
    /// Arguments with the placeholder replaced by `config`.
    pub fn args_for(&self, config: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| {
                if arg == CONFIG_PLACEHOLDER {
                    config.as_os_str().to_os_string()
                } else if arg.contains(CONFIG_PLACEHOLDER) {
                    arg.replace(CONFIG_PLACEHOLDER, &config.to_string_lossy()).into()
                } else {
                    arg.into()
                }
            })
            .collect()
    }
}

/// Runs the configured program as a child process.
#[derive(Debug, Clone)]
pub struct SubprocessProbe {
    command: ProbeCommand,
    tail_lines: usize,
}

impl SubprocessProbe {
    pub fn new(command: ProbeCommand, tail_lines: usize) -> Self {
        Self { command, tail_lines }
    }

    pub fn command(&self) -> &ProbeCommand {
        &self.command
    }

    fn command_for(&self, config_path: &Path) -> Command {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(self.command.args_for(config_path));
        cmd
    }

    /// Runs the program interactively against `config_path`, inheriting the
    /// terminal.  Nothing is captured and no timeout applies.
    ///
    /// # Errors
    ///
    /// Returns the spawn or wait error.
    pub async fn preview(&self, config_path: &Path) -> io::Result<ExitStatus> {
        self.command_for(config_path)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
    }

    /// The data directories the program reports for itself, or `None` when it
    /// cannot be run, fails, or reports nothing.
    pub async fn data_paths(&self, timeout: Duration) -> Option<Vec<PathBuf>> {
        list_data_paths(&self.command.program, [LIST_DATA_PATHS_FLAG], timeout).await
    }
}

/// Runs `program args..` and reads one directory per non-blank stdout line.
///
/// The child is killed if it outlives `timeout`.
pub async fn list_data_paths<I, S>(program: &str, args: I, timeout: Duration) -> Option<Vec<PathBuf>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            debug!(program, error = %err, "data path query could not run");
            return None;
        }
        Err(_) => {
            debug!(program, "data path query timed out");
            return None;
        }
    };
    if !output.status.success() {
        debug!(program, code = ?output.status.code(), "data path query failed");
        return None;
    }

    let paths = parse_data_paths(&String::from_utf8_lossy(&output.stdout));
    if paths.is_empty() {
        None
    } else {
        Some(paths)
    }
}

fn parse_data_paths(stdout: &str) -> Vec<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[async_trait]
impl ProcessProbe for SubprocessProbe {
    fn ensure_available(&self) -> Result<(), ApplyError> {
        which::which(&self.command.program)
            .map(|path| debug!(program = %path.display(), "probe program found"))
            .map_err(|err| {
                ApplyError::not_found("probe program", format!("{}: {err}", self.command.program))
            })
    }

    async fn run(&self, config_path: &Path, timeout: Duration) -> ProbeOutcome {
        let mut cmd = self.command_for(config_path);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(program = %self.command.program, error = %err, "probe could not be started");
                return ProbeOutcome::Crash {
                    exit_code: None,
                    stderr_tail: format!("failed to start {}: {err}", self.command.program),
                };
            }
        };
        debug!(pid = ?child.id(), config = %config_path.display(), "probe started");

        let mut stdout_task = tokio::spawn(collect_tail(child.stdout.take(), self.tail_lines));
        let mut stderr_task = tokio::spawn(collect_tail(child.stderr.take(), self.tail_lines));

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                terminate(&mut child).await;
                stdout_task.abort();
                stderr_task.abort();
                return ProbeOutcome::Crash {
                    exit_code: None,
                    stderr_tail: format!("waiting for the probe failed: {err}"),
                };
            }
            Err(_elapsed) => {
                terminate(&mut child).await;
                stdout_task.abort();
                stderr_task.abort();
                return ProbeOutcome::Timeout;
            }
        };

        let stdout = join_tail(&mut stdout_task).await;
        let stderr = join_tail(&mut stderr_task).await;
        debug!(code = ?status.code(), "probe finished");
        ProbeOutcome::from_exit(status.code(), status.success(), stdout, stderr)
    }
}

/// Reads `reader` line by line, keeping the last `capacity` lines.
async fn collect_tail<R>(reader: Option<R>, capacity: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };
    let mut reader = BufReader::new(reader);
    let mut tail = OutputTail::new(capacity);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                tail.push_line(text.trim_end_matches(['\n', '\r']));
            }
            Err(err) => {
                debug!(error = %err, "probe output stream closed early");
                break;
            }
        }
    }
    tail.into_string()
}

/// Waits briefly for a reader task; a grandchild holding the pipe open must
/// not stall the probe.
async fn join_tail(task: &mut JoinHandle<String>) -> String {
    match tokio::time::timeout(TAIL_GRACE, &mut *task).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(err)) => {
            debug!(error = %err, "probe output reader failed");
            String::new()
        }
        Err(_) => {
            task.abort();
            String::new()
        }
    }
}

/// Kills the child (and its process group on Unix) and reaps it.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        kill_process_group(pid);
    }
    if let Err(err) = child.start_kill() {
        debug!(error = %err, "probe already exited");
    }
    match child.wait().await {
        Ok(status) => debug!(?status, "probe killed and reaped"),
        Err(err) => warn!(error = %err, "reaping the killed probe failed"),
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    if pgid <= 0 {
        return;
    }
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group the child leads.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pgid, error = %err, "killing the probe process group failed");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
