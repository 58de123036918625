//! # chiffre-store
//!
//! Durable local credential state for the Chiffre client, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for the two records the
//! client persists: the authenticated session and the asymmetric key
//! material.  The passphrase and the derived symmetric key are never
//! persisted.

pub mod database;
pub mod keys;
pub mod migrations;
pub mod models;
pub mod session;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
