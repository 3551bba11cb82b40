//! # parley-auth
//!
//! Credential store for the Parley chat server.
//!
//! Holds every registered identity and its secret in memory and writes the
//! whole set through to a pluggable [`CredentialBackend`] on each successful
//! registration. The default backend is a JSON file (`storage.json`) with
//! 0o600 permissions, replaced atomically on every save.
//!
//! Secrets are stored and compared as plaintext.
//!
//! # Example
//!
//! ```no_run
//! use parley_auth::{CredentialStore, JsonFileBackend};
//!
//! let store = CredentialStore::load(JsonFileBackend::new("storage.json"))?;
//! store.register("alice", "pw")?;
//! assert!(store.verify("alice", "pw").is_ok());
//! # Ok::<(), parley_auth::AuthError>(())
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod storage;
pub mod store;
pub mod types;

pub use errors::AuthError;
pub use storage::{CredentialBackend, JsonFileBackend, MemoryBackend, STORAGE_FILE_NAME};
pub use store::CredentialStore;
pub use types::CredentialRecord;
