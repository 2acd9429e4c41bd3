// src/exec/signal.rs

//! Graceful-then-forceful termination of worker processes.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Ask the worker to exit, wait up to `grace`, then kill it.
///
/// On Unix `SIGTERM` and later `SIGKILL` go to the worker's whole process
/// group. Elsewhere the first step is already a hard kill.
pub async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    request_exit(child);

    match timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(
                pid = child.id(),
                grace_ms = grace.as_millis() as u64,
                "worker ignored termination request; killing"
            );
            force_kill(child);
            child.wait().await
        }
    }
}

/// Kill whatever is left of the worker's process group.
///
/// Used after the worker itself exited but something it spawned is still
/// holding the output pipe open.
pub fn kill_leftovers(pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            if let Err(e) = send_to_group(pid, libc::SIGKILL) {
                debug!(pid, error = %e, "no leftover worker processes to kill");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = send_to_group(pid, libc::SIGTERM) {
        debug!(pid, error = %e, "SIGTERM to process group failed; signalling worker only");
        if let Err(e) = send_signal(pid as libc::pid_t, libc::SIGTERM) {
            debug!(pid, error = %e, "SIGTERM to worker failed");
        }
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill request failed; worker may already be gone");
    }
}

fn force_kill(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let _ = send_to_group(pid, libc::SIGKILL);
        }
    }
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill failed; worker may already be gone");
    }
}

/// Signal every process in the group led by `pid`.
#[cfg(unix)]
fn send_to_group(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    send_signal(-(pid as libc::pid_t), signal)
}

#[cfg(unix)]
fn send_signal(target: libc::pid_t, signal: libc::c_int) -> std::io::Result<()> {
    let ret = unsafe { libc::kill(target, signal) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}
