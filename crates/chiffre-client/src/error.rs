use thiserror::Error;

use chiffre_shared::error::KeyError;
use chiffre_store::StoreError;

/// Errors from the directory / authentication service.
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The directory rejected the request.  Surfaced to the caller and
    /// never retried automatically.
    #[error("Authentication rejected ({status}): {message}")]
    AuthRejected { status: u16, message: String },

    /// The request could not be completed.
    #[error("Directory request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The directory answered with a payload we could not interpret.
    #[error("Unexpected directory response: {0}")]
    InvalidResponse(String),
}

/// Errors establishing or persisting key material.  All of these are fatal
/// to session establishment: the caller must block chat entry and surface
/// an actionable message.
#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("Key derivation failed: {0}")]
    Derivation(#[from] KeyError),

    #[error("Key generation failed: {0}")]
    Generation(String),

    #[error("No keypair available to publish")]
    MissingKeypair,

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the account lifecycle (register / login / logout).
#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Keyring error: {0}")]
    Keyring(#[from] KeyringError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the realtime session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// `send` and `typing` are only valid in the `Joined` state.
    #[error("Session is not joined")]
    NotJoined,

    /// The session task has terminated and no longer accepts commands.
    #[error("Session task has terminated")]
    Closed,

    /// Payload encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),
}
