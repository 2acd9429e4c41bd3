// src/protocol/mod.rs

//! The line protocol spoken by worker processes.
//!
//! Workers announce progress, errors and their final payload by printing
//! recognisable lines on their merged stdout/stderr stream:
//!
//! ```text
//! PROGRESS:50
//! ERROR: disk full
//! http://host/img.png
//! ```
//!
//! - [`lines`] turns the raw byte stream into lossily decoded lines.
//! - [`classifier`] maps each line onto an [`OutputEvent`] using an ordered
//!   rule table.

pub mod classifier;
pub mod lines;

pub use classifier::{LineClassifier, ResultShape, WorkerProtocol};
pub use lines::OutputLines;

use serde::Serialize;

/// Progress reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Progress {
    /// `PROGRESS:<n>` with `n` in `0..=100`.
    Percent(u8),
    /// Any other text following the progress marker.
    Message(String),
}

impl Progress {
    pub(crate) fn from_remainder(rest: &str) -> Self {
        let rest = rest.trim();
        match rest.parse::<u8>() {
            Ok(n) if n <= 100 => Progress::Percent(n),
            _ => Progress::Message(rest.to_string()),
        }
    }
}

/// One classified line of worker output.
///
/// Events are produced in the order the worker wrote the lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutputEvent {
    Progress(Progress),
    /// The full line, marker included.
    ErrorLine(String),
    /// The candidate payload text, with any result prefix removed.
    ResultLine(String),
    PlainLog(String),
}

impl OutputEvent {
    /// Whether the event is forwarded to streaming subscribers.
    ///
    /// Plain log lines are diagnostic only.
    pub fn is_published(&self) -> bool {
        !matches!(self, OutputEvent::PlainLog(_))
    }
}
