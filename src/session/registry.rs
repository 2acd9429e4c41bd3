// src/session/registry.rs

//! Slot exclusivity.
//!
//! A slot is a named exclusivity domain, e.g. "the camera try-on process".
//! The registry is the single owner of "which session holds which slot";
//! at most one non-terminal session is recorded per slot.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{ExecutionSession, PendingSession};
use crate::errors::{BridgeError, Result};
use crate::exec::StagedInputs;
use crate::types::SlotPolicy;

/// Which slot a run occupies and what happens when it is busy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotBinding {
    pub name: String,
    pub policy: SlotPolicy,
}

impl SlotBinding {
    pub fn new(name: impl Into<String>, policy: SlotPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
        }
    }

    pub fn reject(name: impl Into<String>) -> Self {
        Self::new(name, SlotPolicy::Reject)
    }

    pub fn replace(name: impl Into<String>) -> Self {
        Self::new(name, SlotPolicy::Replace)
    }
}

#[derive(Debug, Default)]
pub struct SlotRegistry {
    slots: Mutex<HashMap<String, ExecutionSession>>,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `pending` in the given slot.
    ///
    /// - `Reject`: a busy slot fails with [`BridgeError::AlreadyRunning`];
    ///   the running session is not touched and `inputs` are deleted.
    /// - `Replace`: the running session is cancelled and awaited before the
    ///   new one starts.
    ///
    /// The slot lock is held across the whole operation, so two concurrent
    /// starts on one slot are serialised.
    pub async fn start(
        &self,
        binding: &SlotBinding,
        pending: PendingSession,
        inputs: StagedInputs,
    ) -> Result<ExecutionSession> {
        let mut slots = self.slots.lock().await;

        if let Some(current) = slots.get(&binding.name) {
            if !current.state().is_terminal() {
                match binding.policy {
                    SlotPolicy::Reject => {
                        debug!(
                            slot = %binding.name,
                            running = %current.id(),
                            rejected = %pending.id(),
                            "slot busy; rejecting new session"
                        );
                        return Err(BridgeError::AlreadyRunning {
                            slot: binding.name.clone(),
                            session: current.id(),
                        });
                    }
                    SlotPolicy::Replace => {
                        info!(
                            slot = %binding.name,
                            previous = %current.id(),
                            next = %pending.id(),
                            "slot busy; stopping previous session first"
                        );
                        current.cancel();
                        current.wait().await;
                    }
                }
            }
        }

        let session = pending.start(inputs)?;
        slots.insert(binding.name.clone(), session.clone());
        Ok(session)
    }

    /// The session currently recorded for `slot`, if it is still running.
    pub async fn active(&self, slot: &str) -> Option<ExecutionSession> {
        let slots = self.slots.lock().await;
        slots
            .get(slot)
            .filter(|s| !s.state().is_terminal())
            .cloned()
    }

    /// Cancel the session in `slot` and wait until it has ended.
    ///
    /// Returns `false` when the slot was free. Stopping an already finished
    /// session is a no-op.
    pub async fn stop(&self, slot: &str) -> bool {
        let Some(session) = self.active(slot).await else {
            return false;
        };
        session.cancel();
        session.wait().await;
        true
    }
}
