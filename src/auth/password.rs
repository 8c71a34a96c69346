use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::error;

/// Upper bound on accepted password length, in bytes.
pub const MAX_PASSWORD_BYTES: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("password exceeds {MAX_PASSWORD_BYTES} bytes")]
    InputTooLarge,
    #[error("stored password hash is malformed")]
    Malformed,
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

pub fn hash_password(plain: &str) -> Result<String, HashError> {
    if plain.len() > MAX_PASSWORD_BYTES {
        return Err(HashError::InputTooLarge);
    }
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            HashError::Hashing(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Checks `plain` against a stored PHC hash. A mismatch is `Ok(false)`;
/// only an unparsable `hash` is an error.
pub fn verify_password(plain: &str, hash: &str) -> Result<bool, HashError> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        HashError::Malformed
    })?;
    if plain.len() > MAX_PASSWORD_BYTES {
        return Ok(false);
    }
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
