//! Argon2 password hashing.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

#[derive(Debug, thiserror::Error)]
#[error("failed to hash password: {0}")]
pub struct HashError(argon2::password_hash::Error);

pub fn hash_string(password: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(HashError)
}

/// Malformed hashes verify as false rather than erroring; a corrupt stored
/// hash should read as "wrong password", not a 500.
pub fn verify(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_string("hunter22").expect("Failed to hash");
        assert!(verify("hunter22", &hash));
        assert!(!verify("hunter23", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_string("same-password").expect("Failed to hash");
        let b = hash_string("same-password").expect("Failed to hash");
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify("anything", "not-a-phc-string"));
    }
}
