// src/session/driver.rs

//! The per-session task.
//!
//! The driver owns the child process, the single reader of its merged
//! output, the aggregator and the staged inputs. It lives exactly as long
//! as the session is `Running`: it returns once the terminal state and the
//! terminal notification have been published, so no reader outlives its
//! session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{SessionShared, SessionState};
use crate::exec::signal::{kill_leftovers, terminate};
use crate::exec::{LaunchedWorker, StagedInputs};
use crate::outcome::{ExitInfo, FailureKind, Outcome, ResultAggregator};
use crate::protocol::{LineClassifier, OutputEvent, OutputLines};

/// How long the output pipe may stay silent after the worker exited before
/// we stop reading. Something the worker spawned is then holding it open.
const POST_EXIT_DRAIN: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    TimedOut,
}

pub(crate) async fn drive(
    shared: Arc<SessionShared>,
    launched: LaunchedWorker,
    inputs: StagedInputs,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let LaunchedWorker { mut child, output } = launched;
    let pid = child.id();
    let session = shared.id();
    let spec = shared.spec();
    let max_duration = spec.max_duration();

    let classifier = LineClassifier::new(spec.protocol());
    let mut aggregator = ResultAggregator::new(spec.protocol().encoding);
    let mut lines = OutputLines::new(output);

    let deadline = sleep(max_duration);
    tokio::pin!(deadline);

    let mut exit: Option<ExitInfo> = None;
    let mut reading = true;
    let mut lingering_output = false;
    let mut stop: Option<StopReason> = None;
    // An event whose fan-out was cut short by a stop; finished before the
    // terminal notification so every subscriber still receives it.
    let mut interrupted = None;

    // A dropped cancel sender counts as cancellation.
    while stop.is_none() && (reading || exit.is_none()) {
        let exited = exit.is_some();
        let mut event = None;

        tokio::select! {
            biased;

            _ = &mut cancel_rx => stop = Some(StopReason::Cancelled),
            _ = &mut deadline => stop = Some(StopReason::TimedOut),

            status = child.wait(), if !exited => {
                exit = Some(match status {
                    Ok(status) => ExitInfo::from_status(status),
                    Err(e) => {
                        warn!(session = %session, error = %e, "failed to wait for worker");
                        ExitInfo { code: None }
                    }
                });
            }

            line = lines.next_line(), if reading => match line {
                Ok(Some(line)) => event = Some(classify(&classifier, session, &line)),
                Ok(None) => reading = false,
                Err(e) => {
                    warn!(session = %session, error = %e, "worker output unreadable; ignoring the rest");
                    reading = false;
                }
            },

            _ = sleep(POST_EXIT_DRAIN), if reading && exited => {
                debug!(session = %session, "worker exited but its output is still open; stop reading");
                lingering_output = true;
                reading = false;
            }
        }

        let Some(event) = event else {
            continue;
        };
        aggregator.observe(&event);
        if event.is_published() {
            // Publishing may block on a slow subscriber; stay responsive.
            let mut delivery = shared.publisher().delivery(&event);
            tokio::select! {
                biased;
                _ = &mut cancel_rx => stop = Some(StopReason::Cancelled),
                _ = &mut deadline => stop = Some(StopReason::TimedOut),
                _ = delivery.run() => {}
            }
            if !delivery.is_done() {
                interrupted = Some(delivery);
            }
        }
    }

    let (state, outcome) = match stop {
        Some(reason) => {
            match terminate(&mut child, shared.settings().grace_period).await {
                Ok(status) => debug!(session = %session, ?status, "worker terminated"),
                Err(e) => warn!(session = %session, error = %e, "failed to terminate worker"),
            }
            kill_leftovers(pid);
            stopped_outcome(reason, max_duration, &aggregator.diagnostic_text())
        }
        None => {
            if lingering_output {
                kill_leftovers(pid);
            }
            let exit = exit.unwrap_or(ExitInfo { code: None });
            let outcome = aggregator.finish(exit);
            let state = if outcome.is_success() {
                SessionState::Completed
            } else {
                SessionState::Failed
            };
            info!(
                session = %session,
                exit_code = exit.code.unwrap_or(-1),
                success = outcome.is_success(),
                "worker process exited"
            );
            (state, outcome)
        }
    };

    // Leaving `Running`: close the pipe and delete staged inputs first, so
    // anyone observing the terminal state finds them gone.
    drop(lines);
    drop(inputs);

    shared.transition(state, Some(outcome.clone()));
    info!(session = %session, state = %state, "session finished");

    if let Some(mut delivery) = interrupted {
        delivery.run().await;
    }
    shared.publisher().finish(&outcome).await;
}

fn classify(classifier: &LineClassifier, session: super::SessionId, line: &str) -> OutputEvent {
    let event = classifier.classify(line);
    match &event {
        OutputEvent::Progress(progress) => debug!(session = %session, ?progress, "worker progress"),
        OutputEvent::ErrorLine(text) => warn!(session = %session, "worker error: {}", text),
        OutputEvent::ResultLine(text) => info!(session = %session, "worker result line: {}", text),
        OutputEvent::PlainLog(text) => debug!(session = %session, "worker: {}", text),
    }
    event
}

fn stopped_outcome(
    reason: StopReason,
    max_duration: Duration,
    logs: &str,
) -> (SessionState, Outcome) {
    let (state, kind, mut diagnostic) = match reason {
        StopReason::Cancelled => (
            SessionState::Cancelled,
            FailureKind::Cancelled,
            "session cancelled before the worker finished".to_string(),
        ),
        StopReason::TimedOut => (
            SessionState::TimedOut,
            FailureKind::Timeout,
            format!(
                "worker exceeded its time budget of {} ms",
                max_duration.as_millis()
            ),
        ),
    };
    if !logs.is_empty() {
        diagnostic.push_str(":\n");
        diagnostic.push_str(logs);
    }
    (state, Outcome::failure(kind, diagnostic))
}
