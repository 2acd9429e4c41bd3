// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs` holds the TOML-backed raw data model and the validated types.
//! - `loader.rs` reads a config file from disk.
//! - `validate.rs` turns a [`RawConfigFile`] into a [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, RawConfigFile, RawConfigSection, RawWorkerConfig, WorkerConfig};
