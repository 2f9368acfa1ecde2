//! Credential verifier: an opaque one-way function plus verify. The hash
//! format (Argon2id PHC string) is never inspected outside this module.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    Error as HashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordError {
    HashingFailed,
    MalformedHash,
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordError::HashingFailed => write!(f, "password hashing failed"),
            PasswordError::MalformedHash => write!(f, "stored password hash is malformed"),
        }
    }
}

impl std::error::Error for PasswordError {}

pub fn hash_password(secret: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| PasswordError::HashingFailed)
}

pub fn verify_password(secret: &str, stored_hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| PasswordError::MalformedHash)?;

    match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(HashError::Password) => Ok(false),
        Err(_) => Err(PasswordError::MalformedHash),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_accepts_the_original_secret() {
        let hash = hash_password("hunter2hunter2").expect("hash should succeed");
        assert!(verify_password("hunter2hunter2", &hash).expect("verify should succeed"));
        assert!(!verify_password("wrong-password", &hash).expect("verify should succeed"));
    }

    #[test]
    fn hashing_is_salted() {
        let a = hash_password("same-secret").expect("hash should succeed");
        let b = hash_password("same-secret").expect("hash should succeed");
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_stored_hash_is_an_error_not_a_mismatch() {
        let err = verify_password("secret", "not-a-phc-string").unwrap_err();
        assert_eq!(err, PasswordError::MalformedHash);
    }
}
