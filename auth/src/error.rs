//! Error types for authentication operations.

use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Failure modes of hashing and token handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token is malformed, has a bad signature, or was issued elsewhere.
    #[error("Invalid token")]
    InvalidToken,

    /// Token signature is valid but `exp` has passed.
    #[error("Token has expired")]
    TokenExpired,

    /// Password hashing or hash parsing failed.
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    /// Token could not be encoded.
    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

impl AuthError {
    /// Returns `true` if the caller presented bad credentials, as opposed to
    /// a server-side failure.
    ///
    /// # Examples
    ///
    /// ```
    /// # use busdesk_auth::AuthError;
    /// assert!(AuthError::TokenExpired.is_client_error());
    /// assert!(!AuthError::Hashing("oom".into()).is_client_error());
    /// ```
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidToken | Self::TokenExpired)
    }
}
