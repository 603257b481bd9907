//! Per-process configuration.

use std::time::Duration;

use super::error::MutexError;
use crate::ProcessId;

/// Default interval between "still waiting" log lines while blocked in `request_cs`.
pub const DEFAULT_WAIT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Identity and group size of one process, fixed for its lifetime.
///
/// Only built through [`MutexConfig::new`], which guarantees `peer_count >= 1`.
#[derive(Debug, Clone)]
pub struct MutexConfig {
    self_id: ProcessId,
    /// Total number of processes in the group, including self.
    peer_count: u32,
    /// How often a blocked requester logs the replies it still awaits.
    wait_warn_interval: Duration,
}

impl MutexConfig {
    /// Create a config for process `self_id` in a group of `peer_count`.
    pub fn new(self_id: ProcessId, peer_count: u32) -> Result<Self, MutexError> {
        if peer_count == 0 {
            return Err(MutexError::InvalidConfig(
                "peer_count must include at least this process".to_string(),
            ));
        }
        Ok(MutexConfig {
            self_id,
            peer_count,
            wait_warn_interval: DEFAULT_WAIT_WARN_INTERVAL,
        })
    }

    pub fn with_wait_warn_interval(mut self, interval: Duration) -> Self {
        self.wait_warn_interval = interval;
        self
    }

    pub fn self_id(&self) -> ProcessId {
        self.self_id
    }

    pub fn peer_count(&self) -> u32 {
        self.peer_count
    }

    pub fn wait_warn_interval(&self) -> Duration {
        self.wait_warn_interval
    }

    /// Number of replies needed before entering the CS (N - 1).
    #[inline]
    pub fn replies_needed(&self) -> u32 {
        self.peer_count - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replies_needed() {
        assert_eq!(MutexConfig::new(1, 3).unwrap().replies_needed(), 2);
        assert_eq!(MutexConfig::new(1, 1).unwrap().replies_needed(), 0);
    }

    #[test]
    fn test_builder_keeps_identity() {
        let config = MutexConfig::new(4, 6)
            .unwrap()
            .with_wait_warn_interval(Duration::from_millis(250));
        assert_eq!(config.self_id(), 4);
        assert_eq!(config.peer_count(), 6);
        assert_eq!(config.wait_warn_interval(), Duration::from_millis(250));
        assert_eq!(config.replies_needed(), 5);
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(matches!(
            MutexConfig::new(1, 0),
            Err(MutexError::InvalidConfig(_))
        ));
    }
}
