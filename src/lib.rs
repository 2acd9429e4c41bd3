// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod outcome;
pub mod protocol;
pub mod session;
pub mod types;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::engine::{Bridge, RunRequest};
use crate::outcome::{Outcome, Payload};
use crate::session::{ExecutionSession, StreamItem};

/// High-level entry point used by `main.rs`.
///
/// Loads the config, stages `--input` files, runs the selected worker and
/// reports its outcome. Returns whether the run succeeded.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = args.config.clone();
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(true);
    }

    let name = args
        .worker
        .as_deref()
        .context("no worker name given")?;
    let worker = cfg.worker(name)?;

    let mut inputs = cfg.staged_inputs();
    for input in args.inputs.iter() {
        inputs
            .stage_copy(input)
            .with_context(|| format!("staging input {input}"))?;
    }

    let spec = worker.to_spec(args.args.as_slice(), inputs.paths().as_slice());
    let mut request = RunRequest::new(spec).with_inputs(inputs);
    if let Some(slot) = worker.slot_binding() {
        request = request.in_slot(slot);
    }

    let bridge = Bridge::new(cfg.settings);
    info!(worker = %name, "running worker");

    let outcome = if args.stream {
        let mut run = bridge.run_streaming(request).await?;
        debug!(session = %run.events.session_id(), "streaming worker events");
        let ctrl_c = cancel_on_ctrl_c(run.session.clone());

        let mut finished = None;
        while let Some(item) = run.events.next().await {
            println!("{}", serde_json::to_string(&item)?);
            if let StreamItem::Finished { outcome } = item {
                finished = Some(outcome);
            }
        }
        ctrl_c.abort();

        match finished {
            Some(outcome) => outcome,
            None => run.session.wait().await,
        }
    } else {
        let session = bridge.start(request).await?;
        let ctrl_c = cancel_on_ctrl_c(session.clone());
        let outcome = session.wait().await;
        ctrl_c.abort();
        outcome
    };

    report(&outcome, args.output.as_deref(), args.stream).await?;
    Ok(outcome.is_success())
}

/// Ctrl-C → graceful stop of the running session.
fn cancel_on_ctrl_c(session: ExecutionSession) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        warn!(session = %session.id(), "Ctrl+C received, stopping worker");
        session.cancel();
    })
}

async fn report(outcome: &Outcome, output: Option<&str>, streamed: bool) -> Result<()> {
    match outcome {
        Outcome::Success { payload } => {
            if let Some(path) = output {
                let bytes = match payload {
                    Payload::Bytes(b) => b.clone(),
                    other => other.display_text().into_bytes(),
                };
                tokio::fs::write(path, &bytes)
                    .await
                    .with_context(|| format!("writing payload to {path}"))?;
                info!(path = %path, bytes = bytes.len(), "payload written");
            } else if !streamed {
                println!("{}", payload.display_text());
            }
        }
        Outcome::Failure { kind, diagnostic } => {
            if !streamed {
                eprintln!("worker failed ({kind})");
                if !diagnostic.is_empty() {
                    eprintln!("{diagnostic}");
                }
            }
        }
    }
    Ok(())
}

fn print_dry_run(cfg: &ConfigFile) {
    println!("workerbridge dry-run");
    println!(
        "  config.grace_period = {:?}",
        cfg.settings.grace_period
    );
    println!("  config.event_buffer = {}", cfg.settings.event_buffer);
    if let Some(dir) = &cfg.scratch_dir {
        println!("  config.scratch_dir = {}", dir.display());
    }
    println!();

    println!("workers ({}):", cfg.workers.len());
    for (name, worker) in cfg.workers.iter() {
        println!("  - {name}");
        println!("      program: {}", worker.program.display());
        if !worker.args.is_empty() {
            println!("      args: {:?}", worker.args);
        }
        if let Some(cwd) = &worker.cwd {
            println!("      cwd: {}", cwd.display());
        }
        println!("      max_duration: {:?}", worker.max_duration);
        println!("      result: {:?}", worker.protocol.result);
        println!("      encoding: {:?}", worker.protocol.encoding);
        if let Some(slot) = &worker.slot {
            println!("      slot: {} ({:?})", slot.name, slot.policy);
        }
    }

    debug!("dry-run complete (no execution)");
}
