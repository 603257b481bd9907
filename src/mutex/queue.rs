//! FIFO of requesters whose REPLY is deferred until the next release.

use std::collections::VecDeque;

use crate::ProcessId;

/// Deferred requesters in arrival order. Each id appears at most once.
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    ids: VecDeque<ProcessId>,
}

impl PendingQueue {
    pub fn new() -> Self {
        PendingQueue {
            ids: VecDeque::new(),
        }
    }

    /// Append `id` unless it is already queued.
    ///
    /// Returns true if the id was added.
    pub fn enqueue(&mut self, id: ProcessId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.push_back(id);
        true
    }

    /// Remove and return every queued id, oldest first.
    pub fn drain_all(&mut self) -> Vec<ProcessId> {
        self.ids.drain(..).collect()
    }

    pub fn contains(&self, id: ProcessId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.ids.iter().copied()
    }
}
