//! Relay message types.
//!
//! A [`RelayMessage`] is one discrete payload as it travels through the hub:
//! the raw bytes plus the frame kind they arrived in.  The relay never looks
//! inside the payload; it only preserves the kind so a subscriber receives a
//! text frame when the publisher sent text and a binary frame when it sent
//! binary.

/// The frame kind a payload was received in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A UTF-8 text frame.
    Text,
    /// An opaque binary frame (e.g. encoded audio).
    Binary,
}

/// One payload flowing from a sender to its audience.
///
/// Messages are immutable once enqueued: the relay loop borrows them for the
/// whole fan-out pass and every subscriber is sent the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    /// Frame kind to reproduce on delivery.
    pub kind: MessageKind,
    /// Raw payload bytes.  For [`MessageKind::Text`] these are UTF-8.
    pub payload: Vec<u8>,
}

impl RelayMessage {
    /// Creates a text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            payload: text.into().into_bytes(),
        }
    }

    /// Creates a binary message.
    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload: payload.into(),
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
