use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one inbound transfer at one hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HopState {
    Receiving,
    Verifying,
    Delivered,
    Relaying,
    Relayed,
    RelayFailed,
    ChecksumFailed,
    ReceiveFailed,
}

impl HopState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HopState::Delivered
                | HopState::Relayed
                | HopState::RelayFailed
                | HopState::ChecksumFailed
                | HopState::ReceiveFailed
        )
    }
}

impl fmt::Display for HopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HopState::Receiving => "RECEIVING",
            HopState::Verifying => "VERIFYING",
            HopState::Delivered => "DELIVERED",
            HopState::Relaying => "RELAYING",
            HopState::Relayed => "RELAYED",
            HopState::RelayFailed => "RELAY_FAILED",
            HopState::ChecksumFailed => "CHECKSUM_FAILED",
            HopState::ReceiveFailed => "RECEIVE_FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopEvent {
    PayloadReceived,
    ReceiveFailed,
    ChecksumMatched { is_destination: bool },
    ChecksumMismatched,
    ForwardSucceeded,
    ForwardFailed,
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid hop transition: {event:?} in state {state}")]
pub struct InvalidTransition {
    pub state: HopState,
    pub event: HopEvent,
}

/// Tracks a single handler's progress through [`HopState`]
#[derive(Debug)]
pub struct HopStateMachine {
    transfer_id: String,
    state: HopState,
}

impl HopStateMachine {
    pub fn new(transfer_id: impl Into<String>) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            state: HopState::Receiving,
        }
    }

    pub fn current_state(&self) -> HopState {
        self.state
    }

    /// Transition state based on event
    pub fn transition(&mut self, event: HopEvent) -> Result<HopState, InvalidTransition> {
        let next = match (self.state, event) {
            (HopState::Receiving, HopEvent::PayloadReceived) => HopState::Verifying,
            (HopState::Receiving, HopEvent::ReceiveFailed) => HopState::ReceiveFailed,

            (HopState::Verifying, HopEvent::ChecksumMatched { is_destination: true }) => {
                HopState::Delivered
            }
            (HopState::Verifying, HopEvent::ChecksumMatched { is_destination: false }) => {
                HopState::Relaying
            }
            (HopState::Verifying, HopEvent::ChecksumMismatched) => HopState::ChecksumFailed,
            // Acknowledgment could not be delivered or the file could not be read back
            (HopState::Verifying, HopEvent::ReceiveFailed) => HopState::ReceiveFailed,

            (HopState::Relaying, HopEvent::ForwardSucceeded) => HopState::Relayed,
            (HopState::Relaying, HopEvent::ForwardFailed) => HopState::RelayFailed,

            (state, event) => return Err(InvalidTransition { state, event }),
        };

        tracing::debug!(
            transfer_id = %self.transfer_id,
            from = %self.state,
            to = %next,
            "hop state transition"
        );
        self.state = next;
        Ok(next)
    }
}
