// src/engine/mod.rs

//! Public entry points of the bridge.
//!
//! [`Bridge`] turns a [`RunRequest`] into a running session and lets the
//! caller either block on the outcome or consume a live event stream. Both
//! modes go through the same session driver, so classification and
//! aggregation exist exactly once.

pub mod bridge;

pub use bridge::{Bridge, StreamingRun};

use crate::exec::{StagedInputs, WorkerSpec};
use crate::session::SlotBinding;

/// Everything needed to start one worker session.
#[derive(Debug)]
pub struct RunRequest {
    pub spec: WorkerSpec,
    /// `None` runs the worker without any exclusivity constraint.
    pub slot: Option<SlotBinding>,
    /// Temporary files deleted when the session leaves `Running`.
    pub inputs: StagedInputs,
}

impl RunRequest {
    pub fn new(spec: WorkerSpec) -> Self {
        Self {
            spec,
            slot: None,
            inputs: StagedInputs::none(),
        }
    }

    pub fn in_slot(mut self, slot: SlotBinding) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_inputs(mut self, inputs: StagedInputs) -> Self {
        self.inputs = inputs;
        self
    }
}
