// src/protocol/classifier.rs

//! Rule-table classification of worker output lines.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. progress marker prefix  -> [`OutputEvent::Progress`]
//! 2. error marker prefix     -> [`OutputEvent::ErrorLine`]
//! 3. worker's result shape   -> [`OutputEvent::ResultLine`]
//! 4. anything else           -> [`OutputEvent::PlainLog`]
//!
//! Classification never fails; unrecognised lines are plain logs.

use std::sync::LazyLock;

use regex::Regex;

use super::{OutputEvent, Progress};
use crate::types::PayloadEncoding;

/// A scheme, `://` and at least one more character. Only the start of the
/// line is checked; whatever follows belongs to the payload.
static URI_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://\S").expect("URI regex is valid")
});

/// Whether `s`, ignoring surrounding whitespace, starts with a URI scheme
/// followed by `://`.
pub fn looks_like_uri(s: &str) -> bool {
    URI_PREFIX.is_match(s.trim())
}

/// What a worker's final-payload line looks like.
#[derive(Debug, Clone)]
pub enum ResultShape {
    /// Starts with a URI scheme, e.g. `http://host/img.png`.
    Uri,
    /// Starts with a fixed prefix such as `SUCCESS:`; the payload is the rest.
    Prefix(String),
    /// Parses as a JSON object or array.
    Json,
    /// Matches a regex; the payload is capture group 1 if present.
    Pattern(Regex),
    /// Any non-blank line that is not a marker. The last one wins.
    LastLine,
}

/// Everything the bridge needs to know about a worker's output conventions.
#[derive(Debug, Clone)]
pub struct WorkerProtocol {
    pub progress_marker: String,
    pub error_marker: String,
    pub result: ResultShape,
    pub encoding: PayloadEncoding,
}

impl Default for WorkerProtocol {
    fn default() -> Self {
        Self {
            progress_marker: "PROGRESS:".to_string(),
            error_marker: "ERROR".to_string(),
            result: ResultShape::Uri,
            encoding: PayloadEncoding::Text,
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Prefix(String),
    Regex(Regex),
    UriPrefix,
    JsonDocument,
    NonBlank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    Progress,
    Error,
    Result,
}

#[derive(Debug, Clone)]
struct Rule {
    matcher: Matcher,
    kind: RuleKind,
}

impl Rule {
    /// Returns the text carried by the event if the rule matches.
    fn apply<'a>(&self, line: &'a str) -> Option<&'a str> {
        match &self.matcher {
            Matcher::Prefix(prefix) => line.strip_prefix(prefix.as_str()),
            Matcher::Regex(re) => {
                let caps = re.captures(line)?;
                let m = caps.get(1).or_else(|| caps.get(0))?;
                Some(m.as_str())
            }
            Matcher::UriPrefix => {
                let trimmed = line.trim();
                looks_like_uri(trimmed).then_some(trimmed)
            }
            Matcher::JsonDocument => {
                let trimmed = line.trim();
                let parsed = serde_json::from_str::<serde_json::Value>(trimmed).ok()?;
                (parsed.is_object() || parsed.is_array()).then_some(trimmed)
            }
            Matcher::NonBlank => {
                let trimmed = line.trim();
                (!trimmed.is_empty()).then_some(trimmed)
            }
        }
    }
}

/// Stateless per-line classifier built from a [`WorkerProtocol`].
#[derive(Debug, Clone)]
pub struct LineClassifier {
    rules: Vec<Rule>,
}

impl LineClassifier {
    pub fn new(protocol: &WorkerProtocol) -> Self {
        let result_matcher = match &protocol.result {
            ResultShape::Uri => Matcher::UriPrefix,
            ResultShape::Prefix(prefix) => Matcher::Prefix(prefix.clone()),
            ResultShape::Json => Matcher::JsonDocument,
            ResultShape::Pattern(re) => Matcher::Regex(re.clone()),
            ResultShape::LastLine => Matcher::NonBlank,
        };

        let rules = vec![
            Rule {
                matcher: Matcher::Prefix(protocol.progress_marker.clone()),
                kind: RuleKind::Progress,
            },
            Rule {
                matcher: Matcher::Prefix(protocol.error_marker.clone()),
                kind: RuleKind::Error,
            },
            Rule {
                matcher: result_matcher,
                kind: RuleKind::Result,
            },
        ];

        Self { rules }
    }

    pub fn classify(&self, line: &str) -> OutputEvent {
        for rule in &self.rules {
            let Some(text) = rule.apply(line) else {
                continue;
            };
            return match rule.kind {
                RuleKind::Progress => OutputEvent::Progress(Progress::from_remainder(text)),
                RuleKind::Error => OutputEvent::ErrorLine(line.to_string()),
                RuleKind::Result => OutputEvent::ResultLine(text.trim().to_string()),
            };
        }
        OutputEvent::PlainLog(line.to_string())
    }
}
