use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::Session;

impl Database {
    /// Persist the authenticated session.
    ///
    /// Token, identity, and email are written as a unit in a single
    /// statement -- all fields or none.
    pub fn save_session(&self, session: &Session) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO session (id, token, username, email, created_at)
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                session.token,
                session.username,
                session.email,
                session.created_at.to_rfc3339(),
            ],
        )?;

        tracing::debug!(user = %session.username, "session saved");
        Ok(())
    }

    /// Return the persisted session, if any.
    ///
    /// Invoked at startup to resume without re-authenticating.  The
    /// symmetric key is NOT reconstructed here -- the passphrase is never
    /// persisted, so the key manager re-derives it the next time it is
    /// needed.
    pub fn restore_session(&self) -> Result<Option<Session>> {
        let result = self.conn().query_row(
            "SELECT token, username, email, created_at FROM session WHERE id = 1",
            [],
            row_to_session,
        );

        match result {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every credential field in one transaction: token, identity,
    /// email, and both halves of the persisted key material.
    ///
    /// A partial clear would leak stale keys to a subsequently logged-in
    /// identity on the same device, so either everything goes or nothing
    /// does.
    pub fn clear_session(&mut self) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute("DELETE FROM session", [])?;
        tx.execute("DELETE FROM key_material", [])?;
        tx.commit()?;

        tracing::info!("cleared session and key material");
        Ok(())
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let token: String = row.get(0)?;
    let username: String = row.get(1)?;
    let email: String = row.get(2)?;
    let ts_str: String = row.get(3)?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Session {
        token,
        username,
        email,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoredKeyMaterial;

    fn open_test_db(dir: &tempfile::TempDir) -> Database {
        Database::open_at(&dir.path().join("test.db")).unwrap()
    }

    fn test_session() -> Session {
        Session {
            token: "tok-123".to_string(),
            username: "alice".to_string(),
            email: "alice@example.org".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);
        let session = test_session();

        db.save_session(&session).unwrap();
        let restored = db.restore_session().unwrap().expect("session present");

        assert_eq!(restored.token, session.token);
        assert_eq!(restored.username, session.username);
        assert_eq!(restored.email, session.email);
    }

    #[test]
    fn test_restore_absent() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);

        assert!(db.restore_session().unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);

        db.save_session(&test_session()).unwrap();

        let mut next = test_session();
        next.token = "tok-456".to_string();
        next.username = "bob".to_string();
        db.save_session(&next).unwrap();

        let restored = db.restore_session().unwrap().unwrap();
        assert_eq!(restored.token, "tok-456");
        assert_eq!(restored.username, "bob");
    }

    #[test]
    fn test_clear_removes_all_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = open_test_db(&dir);

        db.save_session(&test_session()).unwrap();
        db.save_key_material(&StoredKeyMaterial {
            public_key: [1u8; 32],
            secret_key: [2u8; 32],
            created_at: Utc::now(),
        })
        .unwrap();

        db.clear_session().unwrap();

        assert!(db.restore_session().unwrap().is_none());
        assert!(db.load_key_material().unwrap().is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = open_test_db(&dir);

        db.clear_session().unwrap();
        db.clear_session().unwrap();
    }
}
