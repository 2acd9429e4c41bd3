// src/exec/spec.rs

//! Immutable description of one worker invocation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{BridgeError, Result};
use crate::protocol::WorkerProtocol;

/// Default wall-clock budget for a worker that does not declare one.
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(60);

/// Executable, positional arguments, working directory, time budget and
/// output conventions of a worker.
///
/// The argument vector is passed through untouched; its order and meaning
/// belong to the worker.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    max_duration: Duration,
    protocol: WorkerProtocol,
}

impl WorkerSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            max_duration: DEFAULT_MAX_DURATION,
            protocol: WorkerProtocol::default(),
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

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn with_protocol(mut self, protocol: WorkerProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    pub fn protocol(&self) -> &WorkerProtocol {
        &self.protocol
    }

    /// Reject specs that can never run.
    pub fn validate(&self) -> Result<()> {
        if self.program.as_os_str().is_empty() {
            return Err(BridgeError::InvalidSpec("program must not be empty".into()));
        }
        if self.max_duration.is_zero() {
            return Err(BridgeError::InvalidSpec(
                "max_duration must be greater than zero".into(),
            ));
        }
        if self.protocol.progress_marker.is_empty() || self.protocol.error_marker.is_empty() {
            return Err(BridgeError::InvalidSpec(
                "progress and error markers must not be empty".into(),
            ));
        }
        Ok(())
    }
}
