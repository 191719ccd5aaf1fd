//! Stateful bearer tokens.
//!
//! A token is 16 random bytes rendered as a 26-character unpadded base-32
//! string. Only the SHA-256 hash of the plaintext is stored; verification is
//! a hash lookup scoped by purpose and bounded by expiry.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Token scope for account activation (3 day TTL at issuance sites).
pub const SCOPE_ACTIVATION: &str = "activation";
/// Token scope for API authentication (1 day TTL at issuance sites).
pub const SCOPE_AUTHENTICATION: &str = "authentication";

/// Expected length of a token plaintext in bytes.
pub const PLAINTEXT_LEN: usize = 26;

/// A credential record. The plaintext only exists in memory between
/// generation and the response (or outbound mail) that delivers it.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: Vec<u8>,
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: String,
}

impl Token {
    /// Generate a fresh token for the given user, ttl, and scope.
    pub fn generate(user_id: i64, ttl: Duration, scope: &str) -> Self {
        let mut random_bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut random_bytes);

        let plaintext = base32_nopad(&random_bytes);
        let hash = hash_plaintext(&plaintext);

        Self {
            plaintext,
            hash,
            user_id,
            expiry: Utc::now() + ttl,
            scope: scope.to_string(),
        }
    }
}

/// SHA-256 digest of a token plaintext, the at-rest representation.
pub fn hash_plaintext(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// RFC 4648 base-32 without padding. 16 input bytes yield 26 characters.
fn base32_nopad(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut buffer: u64 = 0;
    let mut bits = 0u32;

    for &byte in bytes {
        buffer = (buffer << 8) | u64::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(char::from(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize]));
        }
    }
    if bits > 0 {
        out.push(char::from(
            BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize],
        ));
    }

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_plaintext_is_26_chars() {
        let token = Token::generate(1, Duration::days(3), SCOPE_ACTIVATION);
        assert_eq!(token.plaintext.len(), PLAINTEXT_LEN);
        assert!(
            token
                .plaintext
                .bytes()
                .all(|b| BASE32_ALPHABET.contains(&b))
        );
    }

    #[test]
    fn test_hash_matches_plaintext_digest() {
        let token = Token::generate(1, Duration::days(1), SCOPE_AUTHENTICATION);
        assert_eq!(token.hash, hash_plaintext(&token.plaintext));
        assert_eq!(token.hash.len(), 32);
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = Token::generate(1, Duration::days(1), SCOPE_AUTHENTICATION);
        let b = Token::generate(1, Duration::days(1), SCOPE_AUTHENTICATION);
        assert_ne!(a.plaintext, b.plaintext);
    }

    #[test]
    fn test_base32_known_vectors() {
        // RFC 4648 test vectors, padding stripped.
        assert_eq!(base32_nopad(b""), "");
        assert_eq!(base32_nopad(b"f"), "MY");
        assert_eq!(base32_nopad(b"fo"), "MZXQ");
        assert_eq!(base32_nopad(b"foo"), "MZXW6");
        assert_eq!(base32_nopad(b"foob"), "MZXW6YQ");
        assert_eq!(base32_nopad(b"fooba"), "MZXW6YTB");
        assert_eq!(base32_nopad(b"foobar"), "MZXW6YTBOI");
    }

    #[test]
    fn test_serialization_hides_hash_and_scope() {
        let token = Token::generate(7, Duration::days(3), SCOPE_ACTIVATION);
        let json = serde_json::to_value(&token).unwrap();

        assert_eq!(json["token"], token.plaintext);
        assert!(json.get("hash").is_none());
        assert!(json.get("scope").is_none());
        assert!(json.get("user_id").is_none());
    }
}
