//! # chiffre-client
//!
//! Client-side core of the Chiffre end-to-end-encrypted chat: account
//! lifecycle against the directory service, key material management, and
//! the realtime session state machine over an injected relay connection.

pub mod account;
pub mod directory;
pub mod error;
pub mod keyring;
pub mod session;
pub mod transport;

use tracing_subscriber::{fmt, EnvFilter};

pub use directory::{AuthResponse, DirectoryClient};
pub use error::{AccountError, DirectoryError, KeyringError, SessionError};
pub use keyring::KeyManager;
pub use session::{
    ConversationEntry, RealtimeSession, SessionCommand, SessionConfig, SessionEvent,
    SessionHandle, SessionSnapshot, SessionState,
};
pub use transport::{RelayConn, RelayEndpoint};

/// Initialise structured logging for embedders.
///
/// Reads `RUST_LOG` when set, otherwise defaults to debug output for the
/// chiffre crates and warnings for everything else.  Call at most once per
/// process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chiffre_client=debug,chiffre_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
