//! Domain model structs persisted in the local credential database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An authenticated directory session.
///
/// Created on successful authentication and destroyed wholesale on logout;
/// never partially populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Bearer token issued by the directory service.
    pub token: String,
    /// Identity announced to the relay.
    pub username: String,
    /// Account email.
    pub email: String,
    /// When this session was established.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

/// Locally cached asymmetric key material (both halves).
///
/// Deliberately not `Serialize`: the secret half must never end up on the
/// wire.  Persistence goes through the typed store helpers only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKeyMaterial {
    /// X25519 public key (32 bytes), stored as hex.
    pub public_key: [u8; 32],
    /// X25519 secret key (32 bytes), stored as hex.
    pub secret_key: [u8; 32],
    /// When the keypair was first generated.
    pub created_at: DateTime<Utc>,
}
