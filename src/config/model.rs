// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{BridgeError, Result};
use crate::exec::{StagedInputs, WorkerSpec};
use crate::protocol::WorkerProtocol;
use crate::session::{SessionSettings, SlotBinding};

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// grace_period = "2s"
/// event_buffer = 64
///
/// [worker.remove_background]
/// program = "python3"
/// args = ["scripts/remove_background.py"]
/// env = { PYTHONUNBUFFERED = "1" }
/// result = "prefix"
/// result_prefix = "SUCCESS:"
///
/// [worker.camera_tryon]
/// program = "python3"
/// args = ["scripts/camera_tryon.py"]
/// slot = "camera"
/// slot_policy = "replace"
/// ```
///
/// Typed values (durations, enums, regexes) are kept as strings here and
/// checked when converting into [`ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: RawConfigSection,

    /// All workers from `[worker.<name>]`.
    #[serde(default)]
    pub worker: BTreeMap<String, RawWorkerConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigSection {
    /// Time between the graceful stop request and the forced kill.
    #[serde(default = "default_grace_period")]
    pub grace_period: String,

    /// Capacity of each streaming subscriber's channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Budget used by workers that do not set `max_duration`.
    #[serde(default = "default_max_duration")]
    pub default_max_duration: String,

    /// Directory for staged input files; the system temp dir when unset.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

fn default_grace_period() -> String {
    "2s".to_string()
}

fn default_event_buffer() -> usize {
    64
}

fn default_max_duration() -> String {
    "60s".to_string()
}

impl Default for RawConfigSection {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            event_buffer: default_event_buffer(),
            default_max_duration: default_max_duration(),
            scratch_dir: None,
        }
    }
}

/// `[worker.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWorkerConfig {
    /// Executable to run, e.g. `python3`.
    pub program: String,

    /// Leading arguments, typically the script path.
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Extra environment variables, e.g. `PYTHONUNBUFFERED = "1"`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub max_duration: Option<String>,

    #[serde(default)]
    pub progress_marker: Option<String>,

    #[serde(default)]
    pub error_marker: Option<String>,

    /// `uri`, `prefix`, `json`, `pattern` or `last_line`.
    #[serde(default)]
    pub result: Option<String>,

    /// Required when `result = "prefix"`.
    #[serde(default)]
    pub result_prefix: Option<String>,

    /// Required when `result = "pattern"`.
    #[serde(default)]
    pub result_pattern: Option<String>,

    /// `text`, `url`, `base64` or `json`.
    #[serde(default)]
    pub encoding: Option<String>,

    #[serde(default)]
    pub slot: Option<String>,

    /// `reject` or `replace`; only meaningful together with `slot`.
    #[serde(default)]
    pub slot_policy: Option<String>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub settings: SessionSettings,
    pub scratch_dir: Option<PathBuf>,
    pub workers: BTreeMap<String, WorkerConfig>,
}

impl ConfigFile {
    pub fn worker(&self, name: &str) -> Result<&WorkerConfig> {
        self.workers
            .get(name)
            .ok_or_else(|| BridgeError::UnknownWorker(name.to_string()))
    }

    /// An empty set of staged inputs living in the configured scratch dir.
    pub fn staged_inputs(&self) -> StagedInputs {
        match &self.scratch_dir {
            Some(dir) => StagedInputs::in_dir(dir),
            None => StagedInputs::none(),
        }
    }
}

/// A validated worker definition.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub max_duration: Duration,
    pub protocol: WorkerProtocol,
    pub slot: Option<SlotBinding>,
}

impl WorkerConfig {
    /// Build the [`WorkerSpec`] for one run.
    ///
    /// Arguments are laid out as: fixed args, then staged input paths, then
    /// caller args.
    pub fn to_spec<S, P>(&self, caller_args: &[S], staged_paths: &[P]) -> WorkerSpec
    where
        S: AsRef<str>,
        P: AsRef<Path>,
    {
        let mut spec = WorkerSpec::new(self.program.clone())
            .args(self.args.iter().cloned())
            .args(
                staged_paths
                    .iter()
                    .map(|p| p.as_ref().to_string_lossy().into_owned()),
            )
            .args(caller_args.iter().map(|a| a.as_ref().to_string()))
            .with_max_duration(self.max_duration)
            .with_protocol(self.protocol.clone());

        if let Some(cwd) = &self.cwd {
            spec = spec.with_cwd(cwd.clone());
        }
        for (key, value) in self.env.iter() {
            spec = spec.with_env(key.as_str(), value.as_str());
        }
        spec
    }

    pub fn slot_binding(&self) -> Option<SlotBinding> {
        self.slot.clone()
    }
}
