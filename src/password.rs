//! Password storage for user accounts: argon2id PHC strings with a random
//! per-password salt.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::{rngs::OsRng, RngCore};

use crate::error::{ContentError, ContentResult};

const SALT_SIZE: usize = 16;

pub fn hash_password(password: &str) -> ContentResult<String> {
    if password.is_empty() {
        return Err(ContentError::InvalidInput("password can not be empty".into()));
    }
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(|e| ContentError::PasswordHash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ContentError::PasswordHash(e.to_string()))
}

/// `Ok(false)` on a mismatch; a stored hash that does not parse is an error.
pub fn verify_password(password: &str, stored: &str) -> ContentResult<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| ContentError::PasswordHash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(ContentError::PasswordHash(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let h = hash_password("passwordfortest").unwrap();
        assert!(h.starts_with("$argon2id$"));
        assert!(verify_password("passwordfortest", &h).unwrap());
        assert!(!verify_password("wrong", &h).unwrap());
    }

    #[test]
    fn salts_differ() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(matches!(hash_password(""), Err(ContentError::InvalidInput(_))));
        assert!(matches!(verify_password("x", "not-a-hash"), Err(ContentError::PasswordHash(_))));
    }
}
