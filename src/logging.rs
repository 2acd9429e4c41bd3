// src/logging.rs

//! Logging setup for `workerbridge` using `tracing` + `tracing-subscriber`.
//!
//! Filter directives are chosen in this order:
//! 1. `--log-level` CLI flag: applies to this crate, dependencies stay at `warn`
//! 2. `WORKERBRIDGE_LOG`: full `EnvFilter` syntax, e.g.
//!    `workerbridge::session=debug,info`
//! 3. `workerbridge=info,warn`
//!
//! Logs are sent to STDERR so that STDOUT only carries worker results and
//! streamed events.

use anyhow::{Context, Result};
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

const ENV_VAR: &str = "WORKERBRIDGE_LOG";
const DEFAULT_DIRECTIVES: &str = "workerbridge=info,warn";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(ENV_VAR).ok();
    let (directives, rejected) = select_directives(cli_level, env_value.as_deref());
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("building log filter from '{directives}'"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))?;

    if let Some(bad) = rejected {
        warn!(var = ENV_VAR, value = %bad, "ignoring unparsable log filter");
    }
    debug!(filter = %directives, "logging initialised");
    Ok(())
}

/// The directive string to use, plus the environment value if it had to be
/// ignored.
fn select_directives(
    cli_level: Option<LogLevel>,
    env_value: Option<&str>,
) -> (String, Option<String>) {
    if let Some(level) = cli_level {
        return (format!("workerbridge={},warn", level_name(level)), None);
    }

    match env_value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) if EnvFilter::try_new(value).is_ok() => (value.to_string(), None),
        Some(value) => (DEFAULT_DIRECTIVES.to_string(), Some(value.to_string())),
        None => (DEFAULT_DIRECTIVES.to_string(), None),
    }
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
