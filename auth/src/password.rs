//! Argon2id password hashing.
//!
//! Hashing is CPU-bound, so the async entry points run on tokio's blocking
//! pool.

use crate::error::{AuthError, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Hash a password into a PHC string (`$argon2id$...`).
///
/// # Errors
///
/// Returns [`AuthError::Hashing`] if Argon2 rejects the input.
pub fn hash_password_blocking(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(format!("Argon2 hash error: {e}")))
}

/// Check a password against a stored PHC string.
///
/// # Errors
///
/// Returns [`AuthError::Hashing`] if the stored hash cannot be parsed.
pub fn verify_password_blocking(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::Hashing(format!("Invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Hash a password on the blocking pool.
///
/// # Errors
///
/// Returns [`AuthError::Hashing`] if hashing fails or the task is cancelled.
pub async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password_blocking(&password))
        .await
        .map_err(|e| AuthError::Hashing(format!("Hashing task failed: {e}")))?
}

/// Verify a password on the blocking pool.
///
/// # Errors
///
/// Returns [`AuthError::Hashing`] if the hash is malformed or the task is cancelled.
pub async fn verify_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password_blocking(&password, &hash))
        .await
        .map_err(|e| AuthError::Hashing(format!("Verification task failed: {e}")))?
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_salted_argon2id() {
        let a = hash_password_blocking("password").unwrap();
        let b = hash_password_blocking("password").unwrap();
        assert!(a.starts_with("$argon2id$"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_verify() {
        let hash = hash_password("correct horse".to_string()).await.unwrap();
        assert!(verify_password("correct horse".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong horse".to_string(), hash).await.unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        let err = verify_password_blocking("password", "plaintext").unwrap_err();
        assert!(matches!(err, AuthError::Hashing(_)));
    }
}
