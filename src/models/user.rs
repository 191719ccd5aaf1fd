//! User account model and password storage.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// A registered account. `version` participates in optimistic concurrency:
/// it starts at 1 and every accepted update increments it by exactly one.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

/// An Argon2id password hash in PHC string format.
///
/// The plaintext never leaves the registration handler; only the hash is
/// stored and compared.
#[derive(Debug, Clone, Default)]
pub struct Password {
    hash: String,
}

impl Password {
    /// Hash a plaintext password with a fresh random salt.
    pub fn set(plaintext: &str) -> AppResult<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

        Ok(Self {
            hash: hash.to_string(),
        })
    }

    /// Wrap a hash loaded from the store.
    pub fn from_hash(hash: String) -> Self {
        Self { hash }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Check a plaintext candidate against the stored hash.
    ///
    /// A mismatch is `Ok(false)`; only a malformed stored hash is an error.
    pub fn matches(&self, plaintext: &str) -> AppResult<bool> {
        let parsed = PasswordHash::new(&self.hash)
            .map_err(|e| AppError::Internal(format!("stored password hash is invalid: {e}")))?;

        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(format!(
                "password verification failed: {e}"
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_set_produces_phc_string() {
        let password = Password::set("correct horse battery").unwrap();
        assert!(password.hash().starts_with("$argon2id$"));
    }

    #[test]
    fn test_matches_accepts_correct_password() {
        let password = Password::set("pa55word1234").unwrap();
        assert!(password.matches("pa55word1234").unwrap());
    }

    #[test]
    fn test_matches_rejects_wrong_password() {
        let password = Password::set("pa55word1234").unwrap();
        assert!(!password.matches("pa55word12345").unwrap());
    }

    #[test]
    fn test_matches_errors_on_garbage_hash() {
        let password = Password::from_hash("not-a-phc-string".to_string());
        assert!(password.matches("anything").is_err());
    }
}
