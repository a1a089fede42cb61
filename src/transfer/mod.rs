//! Transfer records, hop state and the relay wire format

pub mod error;
pub mod state_machine;
pub mod types;
pub mod wire;

pub use error::{TransferError, TransferResult};
pub use state_machine::{HopEvent, HopState, HopStateMachine, InvalidTransition};
pub use types::{
    timestamp_now, Ack, AckStatus, Route, Transfer, TransferMetadata, TransferStatus,
};
