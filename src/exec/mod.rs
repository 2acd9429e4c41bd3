// src/exec/mod.rs

//! Process execution layer.
//!
//! This module knows how to start a worker, hand it its inputs and stop it
//! again; it does not interpret the worker's output.
//!
//! - [`spec`] holds the immutable [`WorkerSpec`] for one invocation.
//! - [`launcher`] spawns the process with stdout and stderr merged into one
//!   pipe.
//! - [`signal`] implements terminate-then-kill with a grace period.
//! - [`inputs`] owns the temporary input files of a session.

pub mod inputs;
pub mod launcher;
pub mod signal;
pub mod spec;

pub use inputs::StagedInputs;
pub use launcher::{LaunchedWorker, MergedOutput, launch};
pub use spec::{DEFAULT_MAX_DURATION, WorkerSpec};
