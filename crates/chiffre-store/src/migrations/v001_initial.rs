//! v001 -- Initial schema creation.
//!
//! Creates the two credential tables: `session` and `key_material`.
//! Both are singleton rows -- the store holds exactly one authenticated
//! identity per device.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Session (singleton)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS session (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    token      TEXT NOT NULL,               -- directory bearer token
    username   TEXT NOT NULL,
    email      TEXT NOT NULL,
    created_at TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Key material (singleton)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS key_material (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    public_key TEXT NOT NULL,               -- hex-encoded 32-byte X25519 pubkey
    secret_key TEXT NOT NULL,               -- hex-encoded 32-byte X25519 secret
    created_at TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
