use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::StoredKeyMaterial;

impl Database {
    /// Persist the asymmetric keypair.  Idempotent: a re-save overwrites
    /// the prior record.
    pub fn save_key_material(&self, keys: &StoredKeyMaterial) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO key_material (id, public_key, secret_key, created_at)
             VALUES (1, ?1, ?2, ?3)",
            params![
                hex::encode(keys.public_key),
                hex::encode(keys.secret_key),
                keys.created_at.to_rfc3339(),
            ],
        )?;

        tracing::debug!("key material saved");
        Ok(())
    }

    /// Return the persisted keypair, or `None` if never generated.
    /// Idempotent; does not mutate the store.
    pub fn load_key_material(&self) -> Result<Option<StoredKeyMaterial>> {
        let result = self.conn().query_row(
            "SELECT public_key, secret_key, created_at FROM key_material WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        );

        let (public_hex, secret_hex, ts_str) = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let created_at: DateTime<Utc> =
            DateTime::parse_from_rfc3339(&ts_str).map(|dt| dt.with_timezone(&Utc))?;

        Ok(Some(StoredKeyMaterial {
            public_key: decode_key(&public_hex)?,
            secret_key: decode_key(&secret_hex)?,
            created_at,
        }))
    }
}

fn decode_key(hex_str: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_str)?;
    if bytes.len() != 32 {
        return Err(StoreError::Corrupt(format!(
            "expected 32-byte key, got {}",
            bytes.len()
        )));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
