// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only setup problems surface as `BridgeError`. Anything that goes wrong
//! inside a worker after it has been spawned becomes an
//! [`Outcome::Failure`](crate::outcome::Outcome) instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionId;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to launch worker '{program}': {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Slot '{slot}' is occupied by running session {session}")]
    AlreadyRunning { slot: String, session: SessionId },

    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    #[error("Invalid worker spec: {0}")]
    InvalidSpec(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BridgeError>;
