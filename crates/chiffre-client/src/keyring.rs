//! Key material lifecycle: derivation, generation, persistence, publication.
//!
//! [`KeyManager`] is the exclusive owner of live key material.  Durable
//! copies go through the store's typed helpers; the passphrase and the
//! derived symmetric key never touch the store.

use chrono::Utc;
use tracing::info;
use zeroize::Zeroize;

use chiffre_shared::crypto::{self, KdfParams, SymmetricKey};
use chiffre_shared::keys::KeyPair;
use chiffre_store::{Database, StoredKeyMaterial};

use crate::directory::DirectoryClient;
use crate::error::KeyringError;

/// Owns the symmetric key and the asymmetric keypair for one identity.
///
/// Any failure leaves the manager unchanged: it never ends up holding
/// half-initialized key material.
pub struct KeyManager {
    symmetric: Option<SymmetricKey>,
    keypair: Option<KeyPair>,
    kdf: KdfParams,
}

impl KeyManager {
    /// Create a manager with the given KDF tuning.
    pub fn new(kdf: KdfParams) -> Self {
        Self {
            symmetric: None,
            keypair: None,
            kdf,
        }
    }

    /// Derive (or re-derive) the shared symmetric key from a passphrase
    /// and salt.
    ///
    /// Deterministic: two devices supplying the same inputs reconstruct an
    /// identical key without it ever crossing the wire.  Called lazily
    /// after a session restore, since the passphrase is never persisted.
    pub fn derive_symmetric(
        &mut self,
        passphrase: &str,
        salt: &[u8],
    ) -> Result<SymmetricKey, KeyringError> {
        let key = crypto::derive_key(passphrase.as_bytes(), salt, &self.kdf)?;
        self.symmetric = Some(key);
        Ok(key)
    }

    /// The current symmetric key, if one has been derived.
    pub fn symmetric_key(&self) -> Option<&SymmetricKey> {
        self.symmetric.as_ref()
    }

    /// Load the persisted keypair, or generate and persist a new one if the
    /// device has none yet.
    ///
    /// A second login on the same device loads the existing pair; it never
    /// generates twice.
    pub fn ensure_keypair(&mut self, db: &Database) -> Result<KeyPair, KeyringError> {
        if let Some(ref keypair) = self.keypair {
            return Ok(keypair.clone());
        }

        let keypair = match db.load_key_material()? {
            Some(stored) => {
                let keypair = KeyPair::from_secret_bytes(&stored.secret_key);
                if keypair.public_bytes() != stored.public_key {
                    return Err(KeyringError::Generation(
                        "persisted public key does not match its secret half".to_string(),
                    ));
                }
                info!(fingerprint = %keypair.fingerprint(), "Loaded existing keypair");
                keypair
            }
            None => {
                let keypair = KeyPair::generate();
                db.save_key_material(&StoredKeyMaterial {
                    public_key: keypair.public_bytes(),
                    secret_key: keypair.secret_bytes(),
                    created_at: Utc::now(),
                })?;
                info!(fingerprint = %keypair.fingerprint(), "Generated and persisted new keypair");
                keypair
            }
        };

        self.keypair = Some(keypair.clone());
        Ok(keypair)
    }

    /// The current keypair, if one has been established.
    pub fn keypair(&self) -> Option<&KeyPair> {
        self.keypair.as_ref()
    }

    /// Upload the public half to the directory under the authenticated
    /// identity.  Idempotent: a republish overwrites the prior record.
    pub async fn publish(
        &self,
        directory: &DirectoryClient,
        token: &str,
    ) -> Result<(), KeyringError> {
        let keypair = self.keypair.as_ref().ok_or(KeyringError::MissingKeypair)?;
        directory
            .upload_public_key(&keypair.public_base64(), token)
            .await?;
        Ok(())
    }

    /// Drop all in-memory key material (logout).
    pub fn clear(&mut self) {
        if let Some(mut key) = self.symmetric.take() {
            key.zeroize();
        }
        self.keypair = None;
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new(KdfParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &[u8] = b"0123456789abcdef";

    fn test_manager() -> KeyManager {
        KeyManager::new(KdfParams::light())
    }

    fn open_test_db(dir: &tempfile::TempDir) -> Database {
        Database::open_at(&dir.path().join("test.db")).unwrap()
    }

    #[test]
    fn test_derive_is_deterministic_across_devices() {
        let mut alice = test_manager();
        let mut bob = test_manager();

        let key_a = alice.derive_symmetric("shared passphrase", SALT).unwrap();
        let key_b = bob.derive_symmetric("shared passphrase", SALT).unwrap();

        assert_eq!(key_a, key_b);
    }

    #[test]
    fn test_failed_derivation_leaves_manager_unchanged() {
        let mut manager = test_manager();

        assert!(manager.derive_symmetric("pw", b"short").is_err());
        assert!(manager.symmetric_key().is_none());
    }

    #[test]
    fn test_keypair_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);

        let mut manager = test_manager();
        let first = manager.ensure_keypair(&db).unwrap();
        let second = manager.ensure_keypair(&db).unwrap();
        assert_eq!(first.public_bytes(), second.public_bytes());

        // A fresh manager on the same device loads the persisted pair
        // instead of generating a new one.
        let mut next_login = test_manager();
        let loaded = next_login.ensure_keypair(&db).unwrap();
        assert_eq!(loaded.public_bytes(), first.public_bytes());
    }

    #[test]
    fn test_mismatched_stored_material_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);

        db.save_key_material(&StoredKeyMaterial {
            public_key: [0xFF; 32],
            secret_key: KeyPair::generate().secret_bytes(),
            created_at: Utc::now(),
        })
        .unwrap();

        let mut manager = test_manager();
        assert!(matches!(
            manager.ensure_keypair(&db),
            Err(KeyringError::Generation(_))
        ));
        assert!(manager.keypair().is_none());
    }

    #[test]
    fn test_clear_drops_material() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);

        let mut manager = test_manager();
        manager.derive_symmetric("pw", SALT).unwrap();
        manager.ensure_keypair(&db).unwrap();

        manager.clear();

        assert!(manager.symmetric_key().is_none());
        assert!(manager.keypair().is_none());
    }
}
