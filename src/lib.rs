//! Distributed mutual exclusion over message passing.
//!
//! N peer processes share no memory and agree on who may enter a critical
//! section (CS) by exchanging timestamped REQUEST and REPLY messages. A process
//! enters only after every other process has replied; concurrent requests are
//! ordered by `(lamport timestamp, process id)`.
//!
//! Layers, leaves first:
//! - [`clock`]: Lamport logical clock
//! - [`mutex`]: per-process admission state machine
//! - [`net`]: message codec, transport seam and an in-process network
//! - [`cluster`]: threaded harness and history checker

pub mod clock;
pub mod cluster;
pub mod mutex;
pub mod net;

/// Identifier of a participating process.
pub type ProcessId = u32;

/// Lamport timestamp.
pub type Timestamp = u64;

pub use clock::{ClockOverflow, LamportClock};
pub use mutex::{
    CsGuard, Grant, MutexConfig, MutexError, MutexProcess, PendingQueue, ProcessSnapshot,
    ProcessState, ProcessStats, Release, RequestStamp,
};
pub use net::{Message, MessageTag, Transport, TransportError, WireError};
