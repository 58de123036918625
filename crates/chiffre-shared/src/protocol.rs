use serde::{Deserialize, Serialize};

use crate::constants::{MAX_MESSAGE_SIZE, TAG_SIZE};
use crate::crypto::Nonce;
use crate::error::ValidationError;

/// The wire form of one encrypted message.
///
/// The nonce is unique per (key, sender) for the lifetime of the key;
/// reuse is a protocol violation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    /// Target room, or the recipient's name for direct messages.
    pub room: String,
    /// Sender identity as announced on join.
    pub sender: String,
    /// XChaCha20-Poly1305 ciphertext (includes the 16-byte tag).
    pub ciphertext: Vec<u8>,
    /// Nonce used for this encryption, needed for decryption.
    pub nonce: Nonce,
}

impl Envelope {
    /// Structural checks applied before any decryption attempt.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.room.is_empty() {
            return Err(ValidationError::EmptyRoom);
        }
        if self.sender.is_empty() {
            return Err(ValidationError::EmptySender);
        }
        if self.ciphertext.len() < TAG_SIZE {
            return Err(ValidationError::TruncatedCiphertext);
        }
        if self.ciphertext.len() > MAX_MESSAGE_SIZE + TAG_SIZE {
            return Err(ValidationError::OversizedPayload);
        }
        Ok(())
    }
}

/// Frames emitted by the client toward the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientFrame {
    /// Announce identity; the relay answers with a presence snapshot.
    Join { username: String },

    /// Encrypted room message, fanned out to all participants.
    Message(Envelope),

    /// Encrypted message routed to a single recipient.
    DirectMessage { to: String, envelope: Envelope },

    /// Typing signal for a room (the relay infers the sender from the
    /// connection).
    Typing { room: String },

    /// Explicit stop-typing signal for a room.
    StopTyping { room: String },
}

/// Frames pushed by the relay to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelayFrame {
    /// Room message from another participant (or our own, reflected back).
    Message(Envelope),

    /// Direct message addressed to this client.
    DirectMessage(Envelope),

    /// A participant started typing.
    Typing { room: String, sender: String },

    /// A participant stopped typing.
    StopTyping { room: String, sender: String },

    /// Full presence snapshot.  Replaces any previously known roster;
    /// never an incremental patch.
    UserList(Vec<String>),
}

impl ClientFrame {
    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl RelayFrame {
    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
