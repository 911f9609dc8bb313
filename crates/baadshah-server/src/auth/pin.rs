use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{AppError, AppResult};

pub const PIN_LENGTH: usize = 4;

pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == PIN_LENGTH && pin.bytes().all(|b| b.is_ascii_digit())
}

pub fn hash_pin(pin: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("PIN hashing failed: {e}")))
}

/// Well-formed argon2id hash with the default cost parameters that matches
/// no PIN. Verifying against it costs the same as a real check.
pub const DECOY_PIN_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

pub fn verify_pin(pin: &str, pin_hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(pin_hash)
        .map_err(|e| AppError::Internal(format!("Stored PIN hash is malformed: {e}")))?;
    Ok(Argon2::default()
        .verify_password(pin.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_must_be_four_digits() {
        assert!(is_valid_pin("0042"));
        assert!(!is_valid_pin("042"));
        assert!(!is_valid_pin("12345"));
        assert!(!is_valid_pin("12a4"));
        assert!(!is_valid_pin("١٢٣٤"));
    }

    #[test]
    fn hash_verifies_only_the_same_pin() {
        let hash = hash_pin("1234").unwrap();
        assert_ne!(hash, "1234");
        assert!(verify_pin("1234", &hash).unwrap());
        assert!(!verify_pin("4321", &hash).unwrap());
    }

    #[test]
    fn decoy_hash_parses_and_matches_nothing() {
        assert!(!verify_pin("1234", DECOY_PIN_HASH).unwrap());
        assert!(!verify_pin("0000", DECOY_PIN_HASH).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_internal_error() {
        assert!(matches!(verify_pin("1234", "plain"), Err(AppError::Internal(_))));
    }
}
