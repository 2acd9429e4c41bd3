// src/engine/bridge.rs

use tracing::debug;

use super::RunRequest;
use crate::errors::Result;
use crate::exec::StagedInputs;
use crate::outcome::Outcome;
use crate::session::{
    ExecutionSession, PendingSession, SessionSettings, SlotBinding, SlotRegistry, Subscription,
};

/// A started session together with a subscription that was attached before
/// the worker was launched, so it sees every event.
#[derive(Debug)]
pub struct StreamingRun {
    pub session: ExecutionSession,
    pub events: Subscription,
}

#[derive(Debug, Default)]
pub struct Bridge {
    settings: SessionSettings,
    registry: SlotRegistry,
}

impl Bridge {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            registry: SlotRegistry::new(),
        }
    }

    /// Launch a session and return its handle without waiting.
    ///
    /// Fails only for setup problems: an invalid spec, an executable that
    /// cannot be started, or a busy slot under the reject policy.
    pub async fn start(&self, request: RunRequest) -> Result<ExecutionSession> {
        let pending = PendingSession::new(request.spec, self.settings);
        self.start_pending(pending, request.slot, request.inputs).await
    }

    /// Run the worker and wait for its terminal outcome.
    pub async fn run_to_completion(&self, request: RunRequest) -> Result<Outcome> {
        let session = self.start(request).await?;
        Ok(session.wait().await)
    }

    /// Run the worker and stream its progress, error and result events,
    /// followed by the terminal outcome.
    pub async fn run_streaming(&self, request: RunRequest) -> Result<StreamingRun> {
        let pending = PendingSession::new(request.spec, self.settings);
        let events = pending.subscribe();
        let session = self
            .start_pending(pending, request.slot, request.inputs)
            .await?;
        Ok(StreamingRun { session, events })
    }

    /// Stop whatever runs in `slot` and wait for it to end.
    pub async fn stop_slot(&self, slot: &str) -> bool {
        self.registry.stop(slot).await
    }

    /// The running session occupying `slot`, if any.
    pub async fn session_in_slot(&self, slot: &str) -> Option<ExecutionSession> {
        self.registry.active(slot).await
    }

    async fn start_pending(
        &self,
        pending: PendingSession,
        slot: Option<SlotBinding>,
        inputs: StagedInputs,
    ) -> Result<ExecutionSession> {
        debug!(
            session = %pending.id(),
            worker = %pending.spec().program().display(),
            slot = slot.as_ref().map(|s| s.name.as_str()).unwrap_or("-"),
            "starting session"
        );
        match slot {
            Some(binding) => self.registry.start(&binding, pending, inputs).await,
            None => pending.start(inputs),
        }
    }
}
