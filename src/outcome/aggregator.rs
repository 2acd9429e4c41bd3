// src/outcome/aggregator.rs

//! Folds a session's classified output and exit status into one [`Outcome`].
//!
//! Checks run in a fixed order and the first one that applies decides:
//!
//! 1. non-zero exit                 -> `Failure(NonZeroExit)`
//! 2. no result line seen           -> `Failure(NoResult)`
//! 3. payload does not decode       -> `Failure(MalformedPayload)`
//! 4. JSON payload reports failure  -> `Failure(WorkerReported)`
//! 5. otherwise                     -> `Success(payload)`
//!
//! A worker that prints a plausible result and then crashes is a failure.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::{FailureKind, Outcome, Payload};
use crate::protocol::OutputEvent;
use crate::protocol::classifier::looks_like_uri;
use crate::types::PayloadEncoding;

/// Exit status of a worker, reduced to what the aggregator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitInfo {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug)]
pub struct ResultAggregator {
    encoding: PayloadEncoding,
    last_result: Option<String>,
    diagnostics: Vec<String>,
}

impl ResultAggregator {
    pub fn new(encoding: PayloadEncoding) -> Self {
        Self {
            encoding,
            last_result: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn observe(&mut self, event: &OutputEvent) {
        match event {
            OutputEvent::ResultLine(text) => self.last_result = Some(text.clone()),
            OutputEvent::ErrorLine(text) | OutputEvent::PlainLog(text) => {
                self.diagnostics.push(text.clone());
            }
            OutputEvent::Progress(_) => {}
        }
    }

    /// ErrorLine and PlainLog text seen so far, one per line.
    pub fn diagnostic_text(&self) -> String {
        self.diagnostics.join("\n")
    }

    pub fn finish(self, exit: ExitInfo) -> Outcome {
        if !exit.success() {
            let mut diagnostic = self.diagnostic_text();
            if diagnostic.is_empty() {
                // Workers whose every line is a result candidate still get a
                // useful message.
                diagnostic = match (&self.last_result, exit.code) {
                    (Some(last), _) => last.clone(),
                    (None, Some(code)) => format!("worker exited with status {code}"),
                    (None, None) => "worker terminated by signal".to_string(),
                };
            }
            return Outcome::failure(FailureKind::NonZeroExit, diagnostic);
        }

        let Some(raw) = self.last_result else {
            let mut diagnostic = "worker exited successfully but printed no result line".to_string();
            let logs = self.diagnostics.join("\n");
            if !logs.is_empty() {
                diagnostic.push_str(":\n");
                diagnostic.push_str(&logs);
            }
            return Outcome::failure(FailureKind::NoResult, diagnostic);
        };

        decode(self.encoding, raw)
    }
}

fn decode(encoding: PayloadEncoding, raw: String) -> Outcome {
    match encoding {
        PayloadEncoding::Text => Outcome::success(Payload::Text(raw)),
        PayloadEncoding::Url => {
            if looks_like_uri(&raw) {
                Outcome::success(Payload::Url(raw))
            } else {
                Outcome::failure(
                    FailureKind::MalformedPayload,
                    format!("{raw}: not an absolute URL"),
                )
            }
        }
        PayloadEncoding::Base64 => match BASE64.decode(raw.trim()) {
            Ok(bytes) => Outcome::success(Payload::Bytes(bytes)),
            Err(e) => Outcome::failure(FailureKind::MalformedPayload, format!("{raw}: {e}")),
        },
        PayloadEncoding::Json => match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => check_reported_status(value),
            Err(e) => Outcome::failure(FailureKind::MalformedPayload, format!("{raw}: {e}")),
        },
    }
}

/// Structured workers answer `{"status": "error", "message": "..."}` when
/// their own logic fails.
fn check_reported_status(value: serde_json::Value) -> Outcome {
    let status = value.get("status").and_then(|s| s.as_str());
    match status {
        Some(s) if s != "success" => {
            let message = value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or(s)
                .to_string();
            Outcome::failure(FailureKind::WorkerReported, message)
        }
        _ => Outcome::success(Payload::Json(value)),
    }
}
