use thiserror::Error;

use super::state::ProcessState;
use crate::clock::ClockOverflow;
use crate::net::{TransportError, WireError};
use crate::ProcessId;

#[derive(Debug, Error)]
pub enum MutexError {
    /// `request_cs` outside RELEASED or `release_cs` outside HELD.
    #[error("{operation} called while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: ProcessState,
    },

    #[error("message from self (process {0})")]
    SelfMessage(ProcessId),

    #[error("clock error: {0}")]
    Clock(#[from] ClockOverflow),

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
