//! Probe outcome classification.
//!
//! A probe is one non-interactive run of the display program against a
//! candidate configuration.  Only the exit status and the last few lines of
//! output are used; the content of the configuration is never inspected.
//!
//! ```text
//! exit 0 within timeout      -> Success
//! non-zero exit / by signal  -> Crash
//! still running at timeout   -> Timeout  (the process is killed first)
//! ```

use std::collections::VecDeque;
use std::fmt;

/// How a single probe run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The program exited with code 0 before the timeout.
    Success {
        /// Tail of standard output.
        output: String,
    },
    /// The program exited unsuccessfully.
    Crash {
        /// Exit code, or `None` if the process was terminated by a signal or
        /// could not be started at all.
        exit_code: Option<i32>,
        /// Tail of standard error.
        stderr_tail: String,
    },
    /// The program was still running when the timeout elapsed and was killed.
    Timeout,
}

impl ProbeOutcome {
    /// Classifies a finished process from its exit status and captured tails.
    pub fn from_exit(exit_code: Option<i32>, success: bool, stdout: String, stderr: String) -> Self {
        if success {
            ProbeOutcome::Success { output: stdout }
        } else {
            ProbeOutcome::Crash {
                exit_code,
                stderr_tail: stderr,
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Success { .. } => f.write_str("probe succeeded"),
            ProbeOutcome::Crash {
                exit_code: Some(code),
                stderr_tail,
            } if stderr_tail.is_empty() => write!(f, "exited with code {code}"),
            ProbeOutcome::Crash {
                exit_code: Some(code),
                stderr_tail,
            } => write!(f, "exited with code {code}: {stderr_tail}"),
            ProbeOutcome::Crash {
                exit_code: None,
                stderr_tail,
            } if stderr_tail.is_empty() => f.write_str("terminated without an exit code"),
            ProbeOutcome::Crash {
                exit_code: None,
                stderr_tail,
            } => write!(f, "terminated without an exit code: {stderr_tail}"),
            ProbeOutcome::Timeout => f.write_str("timed out"),
        }
    }
}

/// Keeps only the last `capacity` lines pushed into it.
///
/// Diagnostic output of the probed program is unbounded in principle; the
/// tail bounds the memory held per probe regardless of how much is printed.
#[derive(Debug, Clone)]
pub struct OutputTail {
    lines: VecDeque<String>,
    capacity: usize,
    dropped: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(256)),
            capacity,
            dropped: 0,
        }
    }

    /// Appends a line, evicting the oldest one when full.
    pub fn push_line(&mut self, line: impl Into<String>) {
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line.into());
    }

    /// Number of lines evicted so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Joins the retained lines with `\n`.
    pub fn into_string(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}
