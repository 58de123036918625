use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,
}

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Salt must be at least {min} bytes, got {actual}")]
    InvalidSalt { min: usize, actual: usize },
}

/// Structural checks on inbound envelopes.  A validation failure is handled
/// exactly like a decryption failure: the message is dropped, the session
/// continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Envelope room is empty")]
    EmptyRoom,

    #[error("Envelope sender is empty")]
    EmptySender,

    #[error("Ciphertext shorter than the authentication tag")]
    TruncatedCiphertext,

    #[error("Payload exceeds the maximum message size")]
    OversizedPayload,
}
