#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use workerbridge::config::{ConfigFile, RawConfigFile, RawConfigSection, RawWorkerConfig};
use workerbridge::exec::WorkerSpec;
use workerbridge::protocol::{ResultShape, WorkerProtocol};
use workerbridge::types::PayloadEncoding;

/// A worker running `sh -c <script>`.
///
/// The default protocol is used (`PROGRESS:`, `ERROR`, URI results) with a
/// short budget so that a hanging test fails quickly.
pub fn sh_worker(script: &str) -> WorkerSpec {
    WorkerSpec::new("sh")
        .arg("-c")
        .arg(script)
        .with_max_duration(Duration::from_secs(5))
}

/// Like [`sh_worker`] but with an explicit result shape and encoding.
pub fn sh_worker_with(script: &str, result: ResultShape, encoding: PayloadEncoding) -> WorkerSpec {
    sh_worker(script).with_protocol(WorkerProtocol {
        result,
        encoding,
        ..WorkerProtocol::default()
    })
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: RawConfigSection::default(),
                worker: BTreeMap::new(),
            },
        }
    }

    pub fn with_worker(mut self, name: &str, worker: RawWorkerConfig) -> Self {
        self.config.worker.insert(name.to_string(), worker);
        self
    }

    pub fn grace_period(mut self, value: &str) -> Self {
        self.config.config.grace_period = value.to_string();
        self
    }

    pub fn event_buffer(mut self, value: usize) -> Self {
        self.config.config.event_buffer = value;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `RawWorkerConfig`.
pub struct WorkerConfigBuilder {
    worker: RawWorkerConfig,
}

impl WorkerConfigBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            worker: RawWorkerConfig {
                program: program.to_string(),
                ..RawWorkerConfig::default()
            },
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.worker.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.worker.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn max_duration(mut self, value: &str) -> Self {
        self.worker.max_duration = Some(value.to_string());
        self
    }

    pub fn result(mut self, shape: &str) -> Self {
        self.worker.result = Some(shape.to_string());
        self
    }

    pub fn result_prefix(mut self, prefix: &str) -> Self {
        self.worker.result_prefix = Some(prefix.to_string());
        self
    }

    pub fn result_pattern(mut self, pattern: &str) -> Self {
        self.worker.result_pattern = Some(pattern.to_string());
        self
    }

    pub fn encoding(mut self, encoding: &str) -> Self {
        self.worker.encoding = Some(encoding.to_string());
        self
    }

    pub fn slot(mut self, slot: &str, policy: &str) -> Self {
        self.worker.slot = Some(slot.to_string());
        self.worker.slot_policy = Some(policy.to_string());
        self
    }

    pub fn build(self) -> RawWorkerConfig {
        self.worker
    }
}
