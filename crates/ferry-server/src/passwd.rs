//! Share-password hashing and verification.
//!
//! Passwords are stored as Argon2id PHC strings. A mismatch is a normal
//! `Ok(false)`; an error means the credential subsystem itself failed or the
//! stored hash is corrupt.

use argon2::{
    password_hash::{rand_core::OsRng, Error as HashError, PasswordHash, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    /// The stored hash is not a valid PHC string (corrupted storage).
    #[error("stored password hash is not a valid PHC string")]
    InvalidHash,
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Hash a plaintext password with a fresh random salt.
pub fn hash(plaintext: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Verify a candidate against a stored hash. Returns `Ok(false)` on a
/// legitimate mismatch.
pub fn verify(stored: &str, candidate: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(|_| PasswordError::InvalidHash)?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(HashError::Password) => Ok(false),
        Err(_) => Err(PasswordError::InvalidHash),
    }
}

/// `hash` on a blocking thread. Argon2 is deliberately CPU-bound; keep it
/// off the async executor.
pub async fn hash_blocking(plaintext: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash(&plaintext))
        .await
        .map_err(|e| PasswordError::Hashing(e.to_string()))?
}

/// `verify` on a blocking thread. Concurrent verifications run independently.
pub async fn verify_blocking(stored: String, candidate: String) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || verify(&stored, &candidate))
        .await
        .map_err(|e| PasswordError::Hashing(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let stored = hash("open sesame").unwrap();
        assert!(verify(&stored, "open sesame").unwrap());
        assert!(!verify(&stored, "open says me").unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash("same input").unwrap();
        let b = hash("same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn corrupt_hash_is_a_distinct_error() {
        let err = verify("not-a-phc-string", "whatever").unwrap_err();
        assert!(matches!(err, PasswordError::InvalidHash));
    }
}
