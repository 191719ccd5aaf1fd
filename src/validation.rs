//! Request payload validation with per-field error maps.
//!
//! Failed checks accumulate into a field -> message map and surface as a 422
//! response, so a client sees every problem with its payload at once rather
//! than one at a time.

use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};
use crate::models::movie::Movie;
use crate::models::token;

/// Maximum length for movie titles and user names, in bytes.
pub const MAX_NAME_LENGTH: usize = 500;

/// First year a movie could have been made.
pub const MIN_MOVIE_YEAR: i32 = 1888;

/// Accumulates validation failures keyed by field name.
#[derive(Debug, Default)]
pub struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` under `field` when `ok` is false. The first message
    /// recorded for a field wins.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consume the validator, producing a 422 error when any check failed.
    pub fn into_result(self) -> AppResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

/// Validate a complete movie record (used for both create and update).
pub fn validate_movie(v: &mut Validator, movie: &Movie) {
    v.check(!movie.title.is_empty(), "title", "must be provided");
    v.check(
        movie.title.len() <= MAX_NAME_LENGTH,
        "title",
        "must not be more than 500 bytes long",
    );

    v.check(movie.year != 0, "year", "must be provided");
    v.check(
        movie.year >= MIN_MOVIE_YEAR,
        "year",
        "must be greater than 1888",
    );
    v.check(
        i64::from(movie.year) <= i64::from(current_year()),
        "year",
        "must not be in the future",
    );

    v.check(movie.runtime != 0, "runtime", "must be provided");
    v.check(movie.runtime > 0, "runtime", "must be a positive integer");

    v.check(!movie.genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(
        movie.genres.len() <= 5,
        "genres",
        "must not contain more than 5 genres",
    );
    v.check(
        all_unique(&movie.genres),
        "genres",
        "must not contain duplicate values",
    );
}

/// Validate an email address.
///
/// The check is deliberately permissive: a non-empty local part and a domain
/// containing a dot. Real validation happens when the activation mail lands.
pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(
        looks_like_email(email),
        "email",
        "must be a valid email address",
    );
}

/// Validate a plaintext password (8-72 bytes).
pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= 8,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= 72,
        "password",
        "must not be more than 72 bytes long",
    );
}

/// Validate a user's registration fields (password is validated separately,
/// before hashing).
pub fn validate_user(v: &mut Validator, name: &str, email: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(
        name.len() <= MAX_NAME_LENGTH,
        "name",
        "must not be more than 500 bytes long",
    );

    validate_email(v, email);
}

/// Validate a token plaintext presented by a client.
pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == token::PLAINTEXT_LEN,
        "token",
        "must be 26 bytes long",
    );
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

fn all_unique(values: &[String]) -> bool {
    let mut seen = std::collections::HashSet::with_capacity(values.len());
    values.iter().all(|value| seen.insert(value))
}

fn current_year() -> i32 {
    use chrono::Datelike;
    chrono::Utc::now().year()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn valid_movie() -> Movie {
        Movie {
            id: 0,
            created_at: Utc::now(),
            title: "Casablanca".to_string(),
            year: 1942,
            runtime: 102,
            genres: vec!["drama".to_string(), "romance".to_string()],
            version: 0,
        }
    }

    #[test]
    fn test_valid_movie_passes() {
        let mut v = Validator::new();
        validate_movie(&mut v, &valid_movie());
        assert!(v.is_valid());
    }

    #[test]
    fn test_movie_year_bounds() {
        let mut movie = valid_movie();
        movie.year = 1800;

        let mut v = Validator::new();
        validate_movie(&mut v, &movie);
        let err = v.into_result().unwrap_err();
        match err {
            AppError::Validation(errors) => {
                assert_eq!(errors.get("year").unwrap(), "must be greater than 1888");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_movie_duplicate_genres() {
        let mut movie = valid_movie();
        movie.genres = vec!["drama".to_string(), "drama".to_string()];

        let mut v = Validator::new();
        validate_movie(&mut v, &movie);
        assert!(!v.is_valid());
    }

    #[test]
    fn test_email_shapes() {
        for good in ["alice@example.com", "a.b@sub.example.org"] {
            let mut v = Validator::new();
            validate_email(&mut v, good);
            assert!(v.is_valid(), "{good} should be accepted");
        }

        for bad in ["", "alice", "alice@", "@example.com", "a b@example.com", "alice@nodot"] {
            let mut v = Validator::new();
            validate_email(&mut v, bad);
            assert!(!v.is_valid(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_password_length_bounds() {
        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "short");
        assert!(!v.is_valid());

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, &"x".repeat(73));
        assert!(!v.is_valid());

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "long enough");
        assert!(v.is_valid());
    }

    #[test]
    fn test_token_plaintext_length() {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, &"A".repeat(26));
        assert!(v.is_valid());

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "too-short");
        assert!(!v.is_valid());
    }

    #[test]
    fn test_first_message_per_field_wins() {
        let mut v = Validator::new();
        v.check(false, "title", "first");
        v.check(false, "title", "second");

        match v.into_result().unwrap_err() {
            AppError::Validation(errors) => assert_eq!(errors.get("title").unwrap(), "first"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
