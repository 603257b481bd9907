//! Message plumbing between processes.
//!
//! The admission protocol only sees the [`Transport`] trait. [`MockNetwork`]
//! provides reliable per-pair FIFO channels between processes living in one
//! binary, which is what the cluster harness and the tests run on.

pub mod message;
pub mod network;
pub mod transport;

pub use message::{Message, MessageTag, WireError};
pub use network::{EndpointSender, Envelope, Inbox, MockNetwork};
pub use transport::{Transport, TransportError};
