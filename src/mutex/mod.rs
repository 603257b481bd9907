//! Request/reply admission to a distributed critical section.
//!
//! A process that wants the CS stamps a REQUEST with its Lamport clock,
//! broadcasts it, and waits for a REPLY from each of the other N-1 processes.
//! A receiver replies at once unless it is in the CS or has an outstanding
//! request of its own that precedes the incoming one; otherwise it queues the
//! requester and replies when it releases.
//!
//! # Invariants
//!
//! 1. **Mutual Exclusion**: at most one process of the group is HELD at a time.
//! 2. **Total Priority**: concurrent requests are ordered by `(timestamp, id)`,
//!    evaluated identically by every process.
//! 3. **Single Writer**: a process's clock, state, queue and reply count are
//!    only touched under its own lock.
//! 4. **Drained on Release**: after `release_cs` the pending queue is empty and
//!    every drained requester was sent exactly one REPLY.

pub mod config;
pub mod error;
pub mod process;
pub mod queue;
pub mod state;


pub use config::{MutexConfig, DEFAULT_WAIT_WARN_INTERVAL};
pub use error::MutexError;
pub use process::{CsGuard, Grant, MutexProcess, ProcessSnapshot, ProcessStats, Release};
pub use queue::PendingQueue;
pub use state::{ProcessState, RequestStamp};
