//! Outbound transport seam used by [`crate::MutexProcess`].

use thiserror::Error;

use super::message::Message;
use crate::ProcessId;

/// Errors raised when handing a message to the transport.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("no link to process {0}")]
    UnknownPeer(ProcessId),

    #[error("link to process {0} is closed")]
    Disconnected(ProcessId),
}

/// Reliable, per-pair FIFO delivery to the other members of the group.
///
/// Implementations must not block: the protocol calls them while holding the
/// process state lock. Inbound delivery is the transport's business; it ends
/// in a call to `MutexProcess::handle_message` or `handle_frame` exactly once
/// per message.
pub trait Transport: Send + Sync {
    /// Send `message` to a single peer.
    fn send_to(&self, target: ProcessId, message: Message) -> Result<(), TransportError>;

    /// Send `message` to every peer except self.
    ///
    /// Returns the number of peers the message was handed to.
    fn broadcast_to_others(&self, message: Message) -> Result<usize, TransportError>;
}
