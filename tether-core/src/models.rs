use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Immutable descriptor of one process invocation.
///
/// The program and each argument are passed to the operating system as
/// discrete tokens; the command line is never concatenated and reparsed by
/// a shell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Must exist at launch time; the harness never creates it.
    pub working_dir: PathBuf,
    /// `None` waits forever. `Some(Duration::ZERO)` means a single timeout
    /// check immediately after launch.
    pub timeout: Option<Duration>,
    /// Extra entries added on top of the parent environment.
    pub env: Vec<(String, String)>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: PathBuf::from("."),
            timeout: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Definitive classification of one execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    /// The process exited on its own before the deadline. A non-zero exit
    /// code is still `Completed`; whether that counts as a failure is the
    /// caller's policy.
    Completed { exit_code: i32 },
    /// The wall-clock timeout elapsed first and the process tree was
    /// terminated.
    TimedOut,
    /// The process could not be started at all (missing executable, bad
    /// working directory, permission denied).
    LaunchFailed { cause: String },
}

impl Outcome {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Outcome::Completed { exit_code } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Result of one execution, immutable after return.
///
/// `stdout` and `stderr` are complete and final: everything the child wrote
/// up to the moment it terminated, nothing after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    pub id: Uuid,
    pub outcome: Outcome,
    pub stdout: String,
    pub stderr: String,
    /// True when any non-whitespace content was observed on the error
    /// stream. Lets callers warn without failing.
    pub stderr_had_output: bool,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessResult {
    /// Completed with exit code zero.
    pub fn success(&self) -> bool {
        matches!(self.outcome, Outcome::Completed { exit_code: 0 })
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.outcome.exit_code()
    }
}
