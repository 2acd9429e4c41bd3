// src/exec/launcher.rs

//! Starting worker processes.
//!
//! The worker's stdout and stderr are both attached to the write end of a
//! single OS pipe, so the parent reads one interleaved stream in the exact
//! order the worker wrote it. Workers announce errors with marker lines on
//! either channel; the bridge does not care which one they used.

use std::process::Stdio;

use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::errors::{BridgeError, Result};
use crate::exec::spec::WorkerSpec;

/// Read half of the merged stdout+stderr pipe.
pub type MergedOutput = Box<dyn AsyncRead + Send + Unpin>;

/// A spawned worker and its merged output stream.
pub struct LaunchedWorker {
    pub child: Child,
    pub output: MergedOutput,
}

/// Spawn the worker described by `spec`.
///
/// Fails with [`BridgeError::Launch`] when the executable cannot be found or
/// started. Anything the worker does after it has started is reported
/// through its output and exit status instead.
pub fn launch(spec: &WorkerSpec) -> Result<LaunchedWorker> {
    let launch_err = |source: std::io::Error| BridgeError::Launch {
        program: spec.program().to_path_buf(),
        source,
    };

    let (reader, writer) = std::io::pipe().map_err(launch_err)?;
    let writer_for_stderr = writer.try_clone().map_err(launch_err)?;

    let mut cmd = Command::new(spec.program());
    cmd.args(spec.arguments())
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(writer_for_stderr)
        .kill_on_drop(true);

    if let Some(cwd) = spec.cwd() {
        cmd.current_dir(cwd);
    }
    for (key, value) in spec.env() {
        cmd.env(key, value);
    }

    // Own process group, so termination signals also reach anything the
    // worker forked (shell pipelines, interpreter subprocesses).
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    debug!(command = ?cmd, "spawning worker");
    let child = cmd.spawn().map_err(launch_err)?;

    // The command still holds our copies of the pipe's write end; they must
    // be closed or the reader never sees end-of-stream.
    drop(cmd);

    let output = merged_reader(reader).map_err(launch_err)?;

    info!(
        worker = %spec.program().display(),
        pid = child.id(),
        args = spec.arguments().len(),
        "worker process started"
    );

    Ok(LaunchedWorker { child, output })
}

#[cfg(unix)]
fn merged_reader(reader: std::io::PipeReader) -> std::io::Result<MergedOutput> {
    use std::os::fd::OwnedFd;
    use tokio::net::unix::pipe;

    let rx = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
    Ok(Box::new(rx))
}

#[cfg(windows)]
fn merged_reader(reader: std::io::PipeReader) -> std::io::Result<MergedOutput> {
    use std::os::windows::io::OwnedHandle;

    let file = std::fs::File::from(OwnedHandle::from(reader));
    Ok(Box::new(tokio::fs::File::from_std(file)))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::protocol::OutputLines;

    #[tokio::test]
    async fn stdout_and_stderr_arrive_on_one_stream_in_order() {
        let spec = WorkerSpec::new("sh")
            .arg("-c")
            .arg("echo one; echo two 1>&2; echo three");
        let mut launched = launch(&spec).expect("sh must be spawnable");

        let mut lines = OutputLines::new(launched.output);
        let mut seen = Vec::new();
        while let Some(line) = lines.next_line().await.expect("read") {
            seen.push(line);
        }
        assert_eq!(seen, vec!["one", "two", "three"]);

        let status = launched.child.wait().await.expect("wait");
        assert!(status.success());
    }

    #[tokio::test]
    async fn missing_executable_is_a_launch_error() {
        let spec = WorkerSpec::new("/definitely/not/here/worker");
        match launch(&spec) {
            Err(BridgeError::Launch { program, .. }) => {
                assert_eq!(program, std::path::PathBuf::from("/definitely/not/here/worker"));
            }
            Err(other) => panic!("expected Launch error, got {other:?}"),
            Ok(_) => panic!("expected Launch error, got a running worker"),
        }
    }

    #[tokio::test]
    async fn missing_working_directory_is_a_launch_error() {
        let spec = WorkerSpec::new("sh")
            .arg("-c")
            .arg("true")
            .with_cwd("/definitely/not/a/dir");
        assert!(matches!(launch(&spec), Err(BridgeError::Launch { .. })));
    }
}
