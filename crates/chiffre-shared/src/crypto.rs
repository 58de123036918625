use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{MIN_SALT_LEN, NONCE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::error::{CryptoError, KeyError};

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];
pub type Nonce = [u8; NONCE_SIZE];

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

pub fn generate_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// Returns (ciphertext, nonce); the envelope carries the nonce as its own
// field, so it is not prepended to the ciphertext.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<(Vec<u8>, Nonce), CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok((ciphertext, nonce_bytes))
}

pub fn decrypt(
    key: &SymmetricKey,
    ciphertext: &[u8],
    nonce: &Nonce,
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Argon2id tuning parameters for the passphrase KDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Number of passes.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 65_536, // 64 MiB
            t_cost: 3,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    /// Light parameters for tests and resource-constrained environments.
    /// Not suitable for protecting real passphrases.
    pub fn light() -> Self {
        Self {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

/// Derive a 256-bit symmetric key from a passphrase and salt with Argon2id.
///
/// Deterministic: two devices supplying the same passphrase and salt
/// reconstruct an identical key without it ever crossing the wire.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<SymmetricKey, KeyError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(KeyError::InvalidSalt {
            min: MIN_SALT_LEN,
            actual: salt.len(),
        });
    }

    let argon_params = argon2::Params::new(
        params.m_cost,
        params.t_cost,
        params.p_cost,
        Some(SYMMETRIC_KEY_SIZE),
    )
    .map_err(|e| KeyError::DerivationFailed(e.to_string()))?;

    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon_params,
    );

    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    argon2
        .hash_password_into(passphrase, salt, &mut key)
        .map_err(|e| KeyError::DerivationFailed(e.to_string()))?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &[u8] = b"0123456789abcdef";

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_symmetric_key();
        let plaintext = b"Rien ne se perd, tout se chiffre.";

        let (ciphertext, nonce) = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &ciphertext, &nonce).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = generate_symmetric_key();
        let key2 = generate_symmetric_key();
        let plaintext = b"Secret message";

        let (ciphertext, nonce) = encrypt(&key1, plaintext).unwrap();
        assert!(decrypt(&key2, &ciphertext, &nonce).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = generate_symmetric_key();
        let plaintext = b"Important data";

        let (mut ciphertext, nonce) = encrypt(&key, plaintext).unwrap();
        let len = ciphertext.len();
        ciphertext[len - 1] ^= 0xFF;

        assert!(decrypt(&key, &ciphertext, &nonce).is_err());
    }

    #[test]
    fn test_wrong_nonce_fails() {
        let key = generate_symmetric_key();
        let (ciphertext, _) = encrypt(&key, b"payload").unwrap();
        let other_nonce = generate_nonce();

        assert!(decrypt(&key, &ciphertext, &other_nonce).is_err());
    }

    #[test]
    fn test_nonce_unique_per_call() {
        let key = generate_symmetric_key();

        let (_, nonce1) = encrypt(&key, b"same plaintext").unwrap();
        let (_, nonce2) = encrypt(&key, b"same plaintext").unwrap();

        assert_ne!(nonce1, nonce2);
    }

    #[test]
    fn test_derive_key_deterministic() {
        let params = KdfParams::light();

        let key1 = derive_key(b"correct horse battery staple", SALT, &params).unwrap();
        let key2 = derive_key(b"correct horse battery staple", SALT, &params).unwrap();

        assert_eq!(key1, key2);
    }

    #[test]
    fn test_different_passphrases_different_keys() {
        let params = KdfParams::light();

        let key1 = derive_key(b"passphrase-a", SALT, &params).unwrap();
        let key2 = derive_key(b"passphrase-b", SALT, &params).unwrap();

        assert_ne!(key1, key2);
    }

    #[test]
    fn test_different_salts_different_keys() {
        let params = KdfParams::light();

        let key1 = derive_key(b"same passphrase", b"salt-aaaaaaaaaaa", &params).unwrap();
        let key2 = derive_key(b"same passphrase", b"salt-bbbbbbbbbbb", &params).unwrap();

        assert_ne!(key1, key2);
    }

    #[test]
    fn test_short_salt_rejected() {
        let result = derive_key(b"passphrase", b"short", &KdfParams::light());
        assert!(matches!(result, Err(KeyError::InvalidSalt { .. })));
    }

    #[test]
    fn test_derived_key_encrypts() {
        let key = derive_key(b"shared secret", SALT, &KdfParams::light()).unwrap();

        let (ciphertext, nonce) = encrypt(&key, b"hi").unwrap();
        assert_eq!(decrypt(&key, &ciphertext, &nonce).unwrap(), b"hi");
    }
}
