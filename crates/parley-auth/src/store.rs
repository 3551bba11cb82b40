//! In-memory credential store with write-through persistence.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::errors::AuthError;
use crate::storage::CredentialBackend;
use crate::types::CredentialRecord;

/// Records in registration order plus a lookup index.
#[derive(Default)]
struct Records {
    ordered: Vec<CredentialRecord>,
    by_name: HashMap<String, usize>,
}

impl Records {
    fn from_loaded(loaded: Vec<CredentialRecord>) -> Self {
        let mut records = Self::default();
        for record in loaded {
            // Later duplicates overwrite earlier ones in place.
            if let Some(&idx) = records.by_name.get(&record.name) {
                records.ordered[idx].password = record.password;
            } else {
                let _ = records
                    .by_name
                    .insert(record.name.clone(), records.ordered.len());
                records.ordered.push(record);
            }
        }
        records
    }

    fn get(&self, name: &str) -> Option<&CredentialRecord> {
        self.by_name.get(name).map(|&idx| &self.ordered[idx])
    }
}

/// Single source of truth for identity → secret mappings.
///
/// Every operation runs under one mutex, and [`register`](Self::register)
/// holds it across the persist call, so a verify never observes a
/// half-applied registration and two registrations of the same identity
/// cannot both succeed.
pub struct CredentialStore {
    records: Mutex<Records>,
    backend: Box<dyn CredentialBackend>,
}

impl CredentialStore {
    /// Load all records from `backend`.
    ///
    /// An absent backend is initialised to an empty collection. A backend
    /// that exists but cannot be read is an error.
    pub fn load(backend: impl CredentialBackend + 'static) -> Result<Self, AuthError> {
        let records = match backend.load()? {
            Some(loaded) => {
                let records = Records::from_loaded(loaded);
                info!(users = records.ordered.len(), "credential store loaded");
                records
            }
            None => {
                backend.save(&[])?;
                info!("credential store not found, initialised empty");
                Records::default()
            }
        };

        Ok(Self {
            records: Mutex::new(records),
            backend: Box::new(backend),
        })
    }

    /// Check `secret` against the record for `identity`.
    ///
    /// Comparison is exact and case-sensitive. Never mutates state.
    pub fn verify(&self, identity: &str, secret: &str) -> Result<(), AuthError> {
        let records = self.records.lock();
        match records.get(identity) {
            None => Err(AuthError::UnknownUser),
            Some(record) if record.password == secret => Ok(()),
            Some(_) => Err(AuthError::CredentialsMismatch),
        }
    }

    /// Register a new identity and persist the full set before returning.
    ///
    /// If persisting fails the in-memory insert is rolled back, so memory
    /// and the backend never diverge.
    pub fn register(&self, identity: &str, secret: &str) -> Result<(), AuthError> {
        let mut records = self.records.lock();
        if records.by_name.contains_key(identity) {
            return Err(AuthError::UserExists);
        }

        let idx = records.ordered.len();
        records.ordered.push(CredentialRecord::new(identity, secret));
        let _ = records.by_name.insert(identity.to_string(), idx);

        if let Err(e) = self.backend.save(&records.ordered) {
            let _ = records.ordered.pop();
            let _ = records.by_name.remove(identity);
            warn!(identity, error = %e, "failed to persist registration, rolled back");
            return Err(e);
        }

        debug!(identity, users = records.ordered.len(), "user registered");
        Ok(())
    }

    /// Whether `identity` is registered.
    pub fn contains(&self, identity: &str) -> bool {
        self.records.lock().by_name.contains_key(identity)
    }

    /// Number of registered users.
    pub fn len(&self) -> usize {
        self.records.lock().ordered.len()
    }

    /// Whether no users are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("users", &self.len())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
