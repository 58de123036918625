/// Application name
pub const APP_NAME: &str = "Chiffre";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// X25519 public key size in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// X25519 secret key size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Minimum accepted KDF salt length in bytes (RFC 9106 recommends 16+)
pub const MIN_SALT_LEN: usize = 8;

/// Maximum message plaintext size in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Quiet period after the last keystroke before a stop-typing signal fires
pub const TYPING_QUIET_PERIOD_MS: u64 = 1_000;

/// Room every participant is placed in after joining
pub const DEFAULT_ROOM: &str = "general";
