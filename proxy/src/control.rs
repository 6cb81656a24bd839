//! Control state machine: which observer, if any, drives the upstream
//! session. At most one claim exists at any instant; the claim holder must
//! be a live observer, so a disconnect forces the release in the same step.

use thiserror::Error;

pub type ObserverId = u32;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("control is already held by observer {holder}")]
    AlreadyControlled { holder: ObserverId },
    #[error("observer already holds control")]
    SelfControlled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlState {
    #[default]
    Unclaimed,
    ClaimedBy(ObserverId),
}

#[derive(Debug, Default)]
pub struct Control {
    state: ControlState,
}

impl Control {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self) -> Option<ObserverId> {
        match self.state {
            ControlState::Unclaimed => None,
            ControlState::ClaimedBy(id) => Some(id),
        }
    }

    pub fn is_controlled(&self) -> bool {
        self.holder().is_some()
    }

    /// Claims control for `id`. Only succeeds from `Unclaimed`.
    pub fn link(&mut self, id: ObserverId) -> Result<(), ControlError> {
        match self.state {
            ControlState::Unclaimed => {
                self.state = ControlState::ClaimedBy(id);
                Ok(())
            }
            ControlState::ClaimedBy(holder) if holder == id => Err(ControlError::SelfControlled),
            ControlState::ClaimedBy(holder) => Err(ControlError::AlreadyControlled { holder }),
        }
    }

    /// Releases the current claim, returning the previous holder. A release
    /// while `Unclaimed` is a no-op.
    pub fn unlink(&mut self) -> Option<ObserverId> {
        let previous = self.holder();
        self.state = ControlState::Unclaimed;
        previous
    }

    /// Forced-release semantics for a disconnecting observer: releases only
    /// if `id` is the holder. Returns true if a claim was released.
    pub fn release_if_held(&mut self, id: ObserverId) -> bool {
        if self.holder() == Some(id) {
            self.state = ControlState::Unclaimed;
            true
        } else {
            false
        }
    }
}
