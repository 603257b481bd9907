//! Process state and the request priority order.

use std::cmp::Ordering;
use std::fmt;

use crate::{ProcessId, Timestamp};

/// Per-process admission state.
///
/// Legal transitions: `Released -> Wanted -> Held -> Released`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessState {
    /// No interest in the CS. Replies to every REQUEST.
    #[default]
    Released,
    /// Waiting for replies to an outstanding request.
    Wanted,
    /// Inside the CS. Defers every REQUEST.
    Held,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Released => f.write_str("RELEASED"),
            ProcessState::Wanted => f.write_str("WANTED"),
            ProcessState::Held => f.write_str("HELD"),
        }
    }
}

/// Priority of a CS request: `(timestamp, process)`.
///
/// Ordered by timestamp, ties broken by the smaller process id. Every process
/// evaluates this on the same pair of values carried in messages, so all of
/// them agree on which of two requests wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestStamp {
    pub timestamp: Timestamp,
    pub process: ProcessId,
}

impl RequestStamp {
    pub fn new(timestamp: Timestamp, process: ProcessId) -> Self {
        RequestStamp { timestamp, process }
    }

    /// True if this request must be admitted before `other`.
    #[inline]
    pub fn precedes(&self, other: &RequestStamp) -> bool {
        self < other
    }
}

impl Ord for RequestStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.process.cmp(&other.process))
    }
}

impl PartialOrd for RequestStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RequestStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(ts={}, p{})", self.timestamp, self.process)
    }
}
