//! Credential record types.

use serde::{Deserialize, Serialize};

/// A single registered user as persisted on disk.
///
/// The field names match the storage file layout
/// (`[{"name": "...", "password": "..."}]`). Secrets are stored as
/// plaintext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Identity the user signs in as. Case-sensitive.
    pub name: String,
    /// Plaintext secret.
    pub password: String,
}

impl CredentialRecord {
    /// Build a record from an identity and secret.
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }
}
