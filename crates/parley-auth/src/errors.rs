//! Auth error types.

/// Errors that can occur during credential operations.
///
/// The first three variants are ordinary authentication outcomes and carry
/// the exact text sent back to clients. `Io` and `Json` are storage failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No record exists for the identity.
    #[error("User does not exist!")]
    UnknownUser,

    /// The identity exists but the secret differs.
    #[error("Credentials mismatch!")]
    CredentialsMismatch,

    /// Registration attempted for an identity that is already taken.
    #[error("User already exists!")]
    UserExists,

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    /// Whether this is an expected authentication outcome rather than a
    /// storage failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnknownUser | Self::CredentialsMismatch | Self::UserExists
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_messages_match_wire_text() {
        assert_eq!(AuthError::UnknownUser.to_string(), "User does not exist!");
        assert_eq!(
            AuthError::CredentialsMismatch.to_string(),
            "Credentials mismatch!"
        );
        assert_eq!(AuthError::UserExists.to_string(), "User already exists!");
    }

    #[test]
    fn rejections_are_classified() {
        assert!(AuthError::UnknownUser.is_rejection());
        assert!(AuthError::CredentialsMismatch.is_rejection());
        assert!(AuthError::UserExists.is_rejection());
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = AuthError::from(io_err);
        assert!(!err.is_rejection());
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: AuthError = json_err.into();
        assert!(matches!(err, AuthError::Json(_)));
        assert!(!err.is_rejection());
    }
}
