use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{PUBLIC_KEY_SIZE, SECRET_KEY_SIZE};

/// A user's asymmetric keypair based on X25519.
///
/// The public half is uploaded to the directory service so other
/// participants can address this identity; the private half never leaves
/// the device.  The keypair is reserved for per-recipient key wrapping --
/// the message cipher itself uses the shared passphrase-derived key.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
}

/// Serializable format for storing identity key material locally.
/// Never sent over the wire.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyPairExport {
    pub secret_key: [u8; SECRET_KEY_SIZE],
    pub public_key: [u8; PUBLIC_KEY_SIZE],
}

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Restore a keypair from secret key bytes.
    pub fn from_secret_bytes(secret: &[u8; SECRET_KEY_SIZE]) -> Self {
        Self {
            secret: StaticSecret::from(*secret),
        }
    }

    /// Restore a keypair from a serialized export.
    pub fn from_export(export: &KeyPairExport) -> Self {
        Self::from_secret_bytes(&export.secret_key)
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.secret)
    }

    /// Get the raw public key bytes.
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key().to_bytes()
    }

    /// Get the public key in its transferable encoding (standard base64).
    pub fn public_base64(&self) -> String {
        BASE64.encode(self.public_bytes())
    }

    /// Get the raw secret key bytes.
    pub fn secret_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        self.secret.to_bytes()
    }

    /// Export the keypair for local persistence.
    pub fn to_export(&self) -> KeyPairExport {
        KeyPairExport {
            secret_key: self.secret.to_bytes(),
            public_key: self.public_bytes(),
        }
    }

    /// Short BLAKE3 fingerprint of the public key, for logs and display.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.public_bytes());
        hex::encode(&hash.as_bytes()[..8])
    }

    /// X25519 agreement with another identity's public key.
    ///
    /// Both sides computing this over each other's public halves arrive at
    /// the same secret -- the primitive a future key-wrapping exchange
    /// would build on.
    pub fn shared_secret(&self, their_public: &[u8; PUBLIC_KEY_SIZE]) -> [u8; 32] {
        let their_key = PublicKey::from(*their_public);
        self.secret.diffie_hellman(&their_key).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let pair = KeyPair::generate();
        assert_eq!(pair.public_bytes().len(), PUBLIC_KEY_SIZE);
        assert_ne!(pair.public_bytes(), [0u8; PUBLIC_KEY_SIZE]);
    }

    #[test]
    fn test_keypair_roundtrip() {
        let pair = KeyPair::generate();
        let export = pair.to_export();
        let restored = KeyPair::from_export(&export);
        assert_eq!(pair.public_bytes(), restored.public_bytes());
    }

    #[test]
    fn test_shared_secret_agreement() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let alice_view = alice.shared_secret(&bob.public_bytes());
        let bob_view = bob.shared_secret(&alice.public_bytes());

        assert_eq!(alice_view, bob_view);
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let pair = KeyPair::generate();
        assert_eq!(pair.fingerprint(), pair.fingerprint());
        assert_eq!(pair.fingerprint().len(), 16);

        let other = KeyPair::generate();
        assert_ne!(pair.fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_public_base64_decodes() {
        let pair = KeyPair::generate();
        let decoded = BASE64.decode(pair.public_base64()).unwrap();
        assert_eq!(decoded, pair.public_bytes());
    }
}
