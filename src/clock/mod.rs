//! Lamport logical clock.
//!
//! # Invariants
//!
//! 1. **Monotonic**: the value never decreases.
//! 2. **Tick**: every local event advances the value by exactly 1.
//! 3. **Receive**: on a message stamped `t`, the value becomes `max(value, t) + 1`.
//! 4. **Bounded**: an update that would pass `Timestamp::MAX` fails with
//!    [`ClockOverflow`] and leaves the value unchanged.
//!
//! The clock is owned by a single process and only mutated under that
//! process's state lock, so it needs no interior synchronization.

use thiserror::Error;

use crate::Timestamp;

/// The clock cannot advance past `Timestamp::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("logical clock cannot advance past {0}")]
pub struct ClockOverflow(pub Timestamp);

/// Per-process Lamport clock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LamportClock {
    value: Timestamp,
}

impl LamportClock {
    /// Create a clock starting at 0.
    pub const fn new() -> Self {
        LamportClock { value: 0 }
    }

    /// Create a clock starting at `initial`.
    pub const fn with_initial(initial: Timestamp) -> Self {
        LamportClock { value: initial }
    }

    /// Current value without advancing.
    #[inline]
    pub fn current(&self) -> Timestamp {
        self.value
    }

    /// Advance for a local event and return the new value.
    #[inline]
    pub fn tick(&mut self) -> Result<Timestamp, ClockOverflow> {
        self.value = self.value.checked_add(1).ok_or(ClockOverflow(self.value))?;
        Ok(self.value)
    }

    /// Merge the timestamp carried by an inbound message and return the new value.
    #[inline]
    pub fn receive_action(&mut self, timestamp: Timestamp) -> Result<Timestamp, ClockOverflow> {
        let merged = self.value.max(timestamp);
        self.value = merged.checked_add(1).ok_or(ClockOverflow(merged))?;
        Ok(self.value)
    }
}
