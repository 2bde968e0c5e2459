//! Access-secret hashing.
//!
//! Secrets gate content retrieval on uploads that request it. Only the argon2
//! PHC string is ever stored or logged; verification goes through the hashing
//! scheme's own comparison, never direct string equality.

use crate::error::AppError;

/// Hash an access secret for storage.
pub fn hash_secret(secret: &str) -> Result<String, AppError> {
    use argon2::{
        password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
        Argon2,
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash secret: {}", e)))
}

/// Verify a plaintext secret against a stored hash.
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, AppError> {
    use argon2::{
        password_hash::{PasswordHash, PasswordVerifier},
        Argon2,
    };

    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid hash format: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let hash = hash_secret("hunter2!").unwrap();
        assert!(verify_secret("hunter2!", &hash).unwrap());
        assert!(!verify_secret("hunter3!", &hash).unwrap());
    }

    #[test]
    fn hash_never_contains_plaintext() {
        let hash = hash_secret("topsecret").unwrap();
        assert!(!hash.contains("topsecret"));
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn malformed_hash_is_an_error_not_a_match() {
        assert!(verify_secret("anything", "not-a-phc-string").is_err());
    }
}
