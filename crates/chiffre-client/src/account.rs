//! Account lifecycle: register, login, restore, logout.
//!
//! Ties the directory client, the credential store, and the key manager
//! together.  Establishment is atomic: a cryptographic or key-establishment
//! failure aborts before anything is persisted, so no component is left
//! holding half-initialized state.

use tracing::info;

use chiffre_store::{Database, Session, StoreError};

use crate::directory::DirectoryClient;
use crate::error::AccountError;
use crate::keyring::KeyManager;

/// Register a new identity with the directory.
///
/// Generates (or loads) the device keypair first and publishes its public
/// half as part of registration, then persists the issued session.
pub async fn register(
    directory: &DirectoryClient,
    db: &Database,
    keys: &mut KeyManager,
    username: &str,
    email: &str,
    password: &str,
) -> Result<Session, AccountError> {
    let keypair = keys.ensure_keypair(db)?;

    let auth = directory
        .register(username, email, password, Some(&keypair.public_base64()))
        .await?;

    let session = auth.into_session();
    db.save_session(&session)?;

    info!(user = %session.username, "Registered and persisted session");
    Ok(session)
}

/// Authenticate an existing identity and establish key material.
///
/// The symmetric key is derived before anything is persisted: a failed
/// derivation blocks chat entry and leaves the device in its prior state.
pub async fn login(
    directory: &DirectoryClient,
    db: &Database,
    keys: &mut KeyManager,
    email: &str,
    password: &str,
    passphrase: &str,
    salt: &[u8],
) -> Result<Session, AccountError> {
    let auth = directory.login(email, password).await?;

    keys.derive_symmetric(passphrase, salt)?;
    keys.ensure_keypair(db)?;

    let session = auth.into_session();
    db.save_session(&session)?;

    info!(user = %session.username, "Logged in and persisted session");
    Ok(session)
}

/// Resume a persisted session without re-authenticating.
///
/// Does not reconstruct the symmetric key -- the passphrase is never
/// persisted, so [`KeyManager::derive_symmetric`] must run again before
/// the first send or receive.
pub fn restore(db: &Database) -> Result<Option<Session>, StoreError> {
    let session = db.restore_session()?;
    if let Some(ref s) = session {
        info!(user = %s.username, "Resumed persisted session");
    }
    Ok(session)
}

/// Log out: wipe every durable credential field and all in-memory key
/// material in one operation.
pub fn logout(db: &mut Database, keys: &mut KeyManager) -> Result<(), StoreError> {
    db.clear_session()?;
    keys.clear();
    info!("Logged out");
    Ok(())
}
