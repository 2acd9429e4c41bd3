// src/config/validate.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

use crate::config::model::{ConfigFile, RawConfigFile, RawWorkerConfig, WorkerConfig};
use crate::errors::{BridgeError, Result};
use crate::protocol::{ResultShape, WorkerProtocol};
use crate::session::{SessionSettings, SlotBinding};
use crate::types::{PayloadEncoding, SlotPolicy, parse_duration};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = BridgeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_workers(&raw)?;

        let grace_period = positive_duration("[config].grace_period", &raw.config.grace_period)?;
        if raw.config.event_buffer == 0 {
            return Err(BridgeError::ConfigError(
                "[config].event_buffer must be >= 1 (got 0)".to_string(),
            ));
        }
        let default_max = positive_duration(
            "[config].default_max_duration",
            &raw.config.default_max_duration,
        )?;

        let mut workers = BTreeMap::new();
        for (name, worker) in raw.worker.iter() {
            workers.insert(name.clone(), build_worker(name, worker, default_max)?);
        }
        validate_slot_policies(&workers)?;

        Ok(ConfigFile {
            settings: SessionSettings {
                grace_period,
                event_buffer: raw.config.event_buffer,
            },
            scratch_dir: raw.config.scratch_dir,
            workers,
        })
    }
}

fn ensure_has_workers(cfg: &RawConfigFile) -> Result<()> {
    if cfg.worker.is_empty() {
        return Err(BridgeError::ConfigError(
            "config must contain at least one [worker.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn positive_duration(field: &str, value: &str) -> Result<Duration> {
    let duration = parse_duration(value)
        .map_err(|e| BridgeError::ConfigError(format!("{field}: {e}")))?;
    if duration.is_zero() {
        return Err(BridgeError::ConfigError(format!(
            "{field} must be greater than zero (got '{value}')"
        )));
    }
    Ok(duration)
}

fn build_worker(name: &str, raw: &RawWorkerConfig, default_max: Duration) -> Result<WorkerConfig> {
    let field = |f: &str| format!("[worker.{name}].{f}");

    if let Some(key) = raw.env.keys().find(|k| k.is_empty() || k.contains('=')) {
        return Err(BridgeError::ConfigError(format!(
            "{} has an invalid variable name '{key}'",
            field("env")
        )));
    }

    if raw.program.trim().is_empty() {
        return Err(BridgeError::ConfigError(format!(
            "{} must not be empty",
            field("program")
        )));
    }

    let max_duration = match &raw.max_duration {
        Some(value) => positive_duration(&field("max_duration"), value)?,
        None => default_max,
    };

    let defaults = WorkerProtocol::default();
    let progress_marker = marker(&field("progress_marker"), &raw.progress_marker)?
        .unwrap_or(defaults.progress_marker);
    let error_marker =
        marker(&field("error_marker"), &raw.error_marker)?.unwrap_or(defaults.error_marker);

    let result = result_shape(name, raw)?;

    let encoding = match &raw.encoding {
        Some(value) => value
            .parse::<PayloadEncoding>()
            .map_err(|e| BridgeError::ConfigError(format!("{}: {e}", field("encoding"))))?,
        None => PayloadEncoding::default(),
    };

    let policy = match &raw.slot_policy {
        Some(value) => value
            .parse::<SlotPolicy>()
            .map_err(|e| BridgeError::ConfigError(format!("{}: {e}", field("slot_policy"))))?,
        None => SlotPolicy::default(),
    };

    let slot = match raw.slot.as_deref().map(str::trim) {
        Some("") => {
            return Err(BridgeError::ConfigError(format!(
                "{} must not be empty",
                field("slot")
            )));
        }
        Some(slot) => Some(SlotBinding::new(slot, policy)),
        None => None,
    };

    Ok(WorkerConfig {
        name: name.to_string(),
        program: PathBuf::from(raw.program.trim()),
        args: raw.args.clone(),
        cwd: raw.cwd.clone(),
        env: raw.env.clone(),
        max_duration,
        protocol: WorkerProtocol {
            progress_marker,
            error_marker,
            result,
            encoding,
        },
        slot,
    })
}

fn marker(field: &str, value: &Option<String>) -> Result<Option<String>> {
    match value {
        Some(m) if m.is_empty() => Err(BridgeError::ConfigError(format!(
            "{field} must not be empty"
        ))),
        other => Ok(other.clone()),
    }
}

fn result_shape(name: &str, raw: &RawWorkerConfig) -> Result<ResultShape> {
    let kind = raw.result.as_deref().unwrap_or("uri").trim().to_lowercase();
    match kind.as_str() {
        "uri" => Ok(ResultShape::Uri),
        "json" => Ok(ResultShape::Json),
        "last_line" => Ok(ResultShape::LastLine),
        "prefix" => match raw.result_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => Ok(ResultShape::Prefix(prefix.to_string())),
            _ => Err(BridgeError::ConfigError(format!(
                "worker '{name}' uses result = \"prefix\" but has no result_prefix"
            ))),
        },
        "pattern" => {
            let pattern = raw.result_pattern.as_deref().ok_or_else(|| {
                BridgeError::ConfigError(format!(
                    "worker '{name}' uses result = \"pattern\" but has no result_pattern"
                ))
            })?;
            let re = Regex::new(pattern).map_err(|e| {
                BridgeError::ConfigError(format!(
                    "worker '{name}' has an invalid result_pattern: {e}"
                ))
            })?;
            Ok(ResultShape::Pattern(re))
        }
        other => Err(BridgeError::ConfigError(format!(
            "worker '{name}' has unknown result shape '{other}' \
             (expected uri, prefix, json, pattern or last_line)"
        ))),
    }
}

/// Workers sharing a slot must agree on what happens when it is busy.
fn validate_slot_policies(workers: &BTreeMap<String, WorkerConfig>) -> Result<()> {
    let mut seen: BTreeMap<&str, (&str, SlotPolicy)> = BTreeMap::new();
    for (name, worker) in workers.iter() {
        let Some(binding) = &worker.slot else {
            continue;
        };
        match seen.get(binding.name.as_str()) {
            Some((other, policy)) if *policy != binding.policy => {
                return Err(BridgeError::ConfigError(format!(
                    "workers '{other}' and '{name}' share slot '{}' with different slot_policy values",
                    binding.name
                )));
            }
            Some(_) => {}
            None => {
                seen.insert(binding.name.as_str(), (name.as_str(), binding.policy));
            }
        }
    }
    Ok(())
}
