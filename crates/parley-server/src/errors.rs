//! Server error types.

/// Errors raised while configuring or starting the chat server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// File I/O error (config file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file was not valid JSON or did not match the schema.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A config value is outside its allowed range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl ServerError {
    /// Build a bind error for `addr`.
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ServerError>;
