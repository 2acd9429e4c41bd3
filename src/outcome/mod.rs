// src/outcome/mod.rs

//! Terminal results of a worker session.
//!
//! Every session ends with exactly one [`Outcome`]. Worker-side problems
//! (crashes, missing or malformed payloads, timeouts) are values here, never
//! errors returned to the caller.

pub mod aggregator;

pub use aggregator::{ExitInfo, ResultAggregator};

use std::fmt;

use serde::Serialize;

/// Decoded payload of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Text(String),
    Url(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Payload {
    /// Human-readable rendering used by the CLI.
    pub fn display_text(&self) -> String {
        match self {
            Payload::Text(s) | Payload::Url(s) => s.clone(),
            Payload::Bytes(b) => format!("<{} bytes>", b.len()),
            Payload::Json(v) => v.to_string(),
        }
    }
}

/// Why a session did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The worker exited with a non-zero status (or was killed by a signal).
    NonZeroExit,
    /// The worker exited cleanly without printing a result line.
    NoResult,
    /// The result line did not decode under the worker's encoding.
    MalformedPayload,
    /// The structured payload itself reported a failure status.
    WorkerReported,
    /// The per-session deadline expired.
    Timeout,
    /// The session was cancelled by its owner.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::NonZeroExit => "non-zero exit",
            FailureKind::NoResult => "no result",
            FailureKind::MalformedPayload => "malformed payload",
            FailureKind::WorkerReported => "worker reported failure",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The terminal value of a session. Set exactly once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success { payload: Payload },
    Failure { kind: FailureKind, diagnostic: String },
}

impl Outcome {
    pub fn success(payload: Payload) -> Self {
        Outcome::Success { payload }
    }

    pub fn failure(kind: FailureKind, diagnostic: impl Into<String>) -> Self {
        Outcome::Failure {
            kind,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Outcome::Success { payload } => Some(payload),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { kind, .. } => Some(*kind),
        }
    }
}
