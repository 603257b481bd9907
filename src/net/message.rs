//! Protocol messages and their wire frame.
//!
//! The sender id is not part of the frame: the transport knows which link a
//! frame arrived on and hands it to the receiver alongside the bytes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Timestamp;

/// Closed set of message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    /// Ask every peer for permission to enter the CS.
    Request,
    /// Grant permission to a requester.
    Reply,
}

impl MessageTag {
    /// Tag byte used on the wire.
    pub fn as_u8(self) -> u8 {
        match self {
            MessageTag::Request => 0,
            MessageTag::Reply => 1,
        }
    }
}

impl TryFrom<u8> for MessageTag {
    type Error = WireError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(MessageTag::Request),
            1 => Ok(MessageTag::Reply),
            other => Err(WireError::UnknownTag(other)),
        }
    }
}

/// A protocol message: a tag plus the sender's Lamport timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub tag: MessageTag,
    pub timestamp: Timestamp,
}

/// Errors decoding a wire frame.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    #[error("malformed frame: {0}")]
    Decode(#[from] bincode::Error),
}

/// On-the-wire layout. The tag stays a raw byte so that unknown tags reach
/// `MessageTag::try_from` instead of failing inside serde.
#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    tag: u8,
    timestamp: Timestamp,
}

impl Message {
    pub fn request(timestamp: Timestamp) -> Self {
        Message {
            tag: MessageTag::Request,
            timestamp,
        }
    }

    pub fn reply(timestamp: Timestamp) -> Self {
        Message {
            tag: MessageTag::Reply,
            timestamp,
        }
    }

    /// Encode to a wire frame.
    pub fn encode(&self) -> Vec<u8> {
        let frame = Frame {
            tag: self.tag.as_u8(),
            timestamp: self.timestamp,
        };
        bincode::serialize(&frame).expect("Frame serialization should not fail")
    }

    /// Decode a wire frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let frame: Frame = bincode::deserialize(bytes)?;
        Ok(Message {
            tag: MessageTag::try_from(frame.tag)?,
            timestamp: frame.timestamp,
        })
    }
}
