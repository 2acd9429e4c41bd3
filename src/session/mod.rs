// src/session/mod.rs

//! Execution sessions: one worker process, from launch to outcome.
//!
//! - [`state`] defines the lifecycle state machine.
//! - [`publisher`] fans classified events out to streaming subscribers.
//! - [`driver`] is the per-session task that owns the child process.
//! - [`registry`] enforces "one active session per slot".
//!
//! A session starts life as a [`PendingSession`] (state `Idle`). Starting it
//! launches the worker and yields an [`ExecutionSession`] handle, which can
//! be cloned freely; every clone observes the same state and outcome.

pub mod driver;
pub mod publisher;
pub mod registry;
pub mod state;

pub use publisher::{StreamItem, Subscription};
pub use registry::{SlotBinding, SlotRegistry};
pub use state::{SessionState, SessionStatus};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::{StagedInputs, WorkerSpec, launch};
use crate::outcome::Outcome;
use publisher::Publisher;

/// Opaque, process-unique session identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SessionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Knobs shared by every session of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Time between the graceful termination request and the hard kill.
    pub grace_period: Duration,
    /// Capacity of each subscriber's channel.
    pub event_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(2),
            event_buffer: 64,
        }
    }
}

/// State shared between session handles and the driver task.
#[derive(Debug)]
pub(crate) struct SessionShared {
    id: SessionId,
    spec: Arc<WorkerSpec>,
    settings: SessionSettings,
    status: watch::Sender<SessionStatus>,
    publisher: Publisher,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl SessionShared {
    /// Apply a state transition; refuses anything that is not monotonic.
    pub(crate) fn transition(&self, next: SessionState, outcome: Option<Outcome>) -> bool {
        let mut applied = false;
        self.status.send_if_modified(|status| {
            if !status.state.can_transition_to(next) {
                return false;
            }
            status.state = next;
            if next.is_terminal() {
                status.outcome = outcome.clone();
            }
            applied = true;
            true
        });

        if !applied {
            warn!(
                session = %self.id,
                to = %next,
                "ignoring invalid session state transition"
            );
        }
        applied
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    pub(crate) fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub(crate) fn publisher(&self) -> &Publisher {
        &self.publisher
    }
}

/// A session that has not been started yet (state `Idle`).
///
/// Subscribing before [`start`](PendingSession::start) guarantees that no
/// event of the run is missed.
#[derive(Debug)]
pub struct PendingSession {
    shared: Arc<SessionShared>,
}

impl PendingSession {
    pub fn new(spec: WorkerSpec, settings: SessionSettings) -> Self {
        let id = SessionId::next();
        let (status, _) = watch::channel(SessionStatus::idle());
        let shared = SessionShared {
            id,
            spec: Arc::new(spec),
            settings,
            status,
            publisher: Publisher::new(id, settings.event_buffer),
            cancel: Mutex::new(None),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.shared.spec
    }

    pub fn subscribe(&self) -> Subscription {
        self.shared.publisher.subscribe()
    }

    /// Launch the worker and hand it to a dedicated driver task.
    ///
    /// On error the session never ran: the staged inputs are deleted and
    /// early subscribers see their channel close without a terminal item.
    pub fn start(self, inputs: StagedInputs) -> Result<ExecutionSession> {
        let shared = self.shared;
        shared.spec.validate()?;

        let launched = launch(&shared.spec)?;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        *shared.cancel.lock().unwrap_or_else(|p| p.into_inner()) = Some(cancel_tx);
        shared.transition(SessionState::Running, None);

        info!(
            session = %shared.id,
            worker = %shared.spec.program().display(),
            max_duration_ms = shared.spec.max_duration().as_millis() as u64,
            staged_inputs = inputs.len(),
            "session running"
        );

        tokio::spawn(driver::drive(shared.clone(), launched, inputs, cancel_rx));

        Ok(ExecutionSession { shared })
    }
}

/// Handle to a started session.
#[derive(Debug, Clone)]
pub struct ExecutionSession {
    shared: Arc<SessionShared>,
}

impl ExecutionSession {
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.shared.spec
    }

    pub fn state(&self) -> SessionState {
        self.shared.status.borrow().state
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status.borrow().clone()
    }

    /// The outcome, if the session already reached a terminal state.
    pub fn outcome(&self) -> Option<Outcome> {
        self.shared.status.borrow().outcome.clone()
    }

    /// Watch state changes; late observers immediately see the latest value.
    pub fn watch(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    pub fn subscribe(&self) -> Subscription {
        self.shared.publisher.subscribe()
    }

    /// Request termination of a running session.
    ///
    /// Returns as soon as the request is recorded; the session becomes
    /// `Cancelled` once the worker has actually exited. Returns `false` when
    /// there was nothing to cancel (already terminal or already cancelling).
    pub fn cancel(&self) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        let sender = self
            .shared
            .cancel
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        match sender {
            Some(tx) => {
                let requested = tx.send(()).is_ok();
                debug!(session = %self.shared.id, requested, "cancellation requested");
                requested
            }
            None => false,
        }
    }

    /// Alias of [`cancel`](Self::cancel); a no-op on terminal sessions.
    pub fn stop(&self) -> bool {
        self.cancel()
    }

    /// Wait for the terminal outcome.
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.shared.status.subscribe();
        loop {
            let current = rx.borrow_and_update().outcome.clone();
            if let Some(outcome) = current {
                return outcome;
            }
            // The sender lives in `shared`, which this handle keeps alive.
            let _ = rx.changed().await;
        }
    }
}
