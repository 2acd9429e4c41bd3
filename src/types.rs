// src/types.rs

//! Small shared enums parsed from configuration and the CLI.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do when a session is started on a slot that is still busy.
///
/// - `Reject`: fail fast with `AlreadyRunning`; the running session is left
///   untouched (default behaviour).
/// - `Replace`: cancel the running session, wait until it has reached a
///   terminal state, then start the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotPolicy {
    #[default]
    Reject,
    Replace,
}

impl FromStr for SlotPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(SlotPolicy::Reject),
            "replace" => Ok(SlotPolicy::Replace),
            other => Err(format!(
                "invalid slot_policy: {other} (expected \"reject\" or \"replace\")"
            )),
        }
    }
}

/// How the payload carried by the final result line is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// The line is returned verbatim.
    #[default]
    Text,
    /// The line must look like an absolute URI.
    Url,
    /// The line is standard-alphabet base64 and decodes to raw bytes.
    Base64,
    /// The line is a JSON document.
    Json,
}

impl FromStr for PayloadEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(PayloadEncoding::Text),
            "url" => Ok(PayloadEncoding::Url),
            "base64" => Ok(PayloadEncoding::Base64),
            "json" => Ok(PayloadEncoding::Json),
            other => Err(format!(
                "invalid encoding: {other} (expected text, url, base64 or json)"
            )),
        }
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
