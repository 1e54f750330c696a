//! Password hashing and random secrets.
//!
//! Stored password hashes use the three-field form
//! `sha512:<hashBase64>:<saltBase64>`. The salt is 16 random bytes and is
//! regenerated on every hash, so hashing the same password twice never
//! yields the same string.

use {
    base64::Engine,
    base64::engine::general_purpose::STANDARD as B64,
    rand::{Rng, RngCore},
    sha2::{Digest, Sha512},
};

/// Alphabet for human-readable invite codes. Excludes glyph pairs that are
/// easy to misread (`I`/`l`/`1`, `O`/`0`, `v`).
pub const HUMAN_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuwxyz23456789";

const SALT_BYTES: usize = 16;
const TOKEN_BYTES: usize = 32;
const HASH_ALGO: &str = "sha512";

#[derive(Debug, thiserror::Error)]
#[error("malformed password hash")]
pub struct MalformedHash;

/// Hash a password with a fresh random salt.
pub fn hash_password(pass: &str) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::rng().fill_bytes(&mut salt);
    let digest = salted_digest(pass, &salt);
    format!("{HASH_ALGO}:{}:{}", B64.encode(digest), B64.encode(salt))
}

/// Check a password against a stored `sha512:<hash>:<salt>` string.
///
/// The digest comparison runs over every byte regardless of where the first
/// mismatch occurs.
pub fn check_password(pass: &str, stored: &str) -> bool {
    let Ok((hash, salt)) = decode_stored(stored) else {
        return false;
    };
    let digest = salted_digest(pass, &salt);
    constant_time_eq(&digest, &hash)
}

/// A uniform random numeric code, zero-padded to `digits`.
pub fn random_code(digits: usize) -> String {
    let max = 10u64.pow(digits as u32);
    let n = rand::rng().random_range(0..max);
    format!("{n:0width$}", width = digits)
}

/// A fresh 32-byte auth token as lowercase hex.
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    let mut out = String::with_capacity(TOKEN_BYTES * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// A human-readable code of `len` characters from [`HUMAN_ALPHABET`].
pub fn human_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let i = rng.random_range(0..HUMAN_ALPHABET.len());
            HUMAN_ALPHABET[i] as char
        })
        .collect()
}

fn salted_digest(pass: &str, salt: &[u8]) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(salt);
    hasher.update(pass.as_bytes());
    hasher.finalize().to_vec()
}

fn decode_stored(stored: &str) -> Result<(Vec<u8>, Vec<u8>), MalformedHash> {
    let mut parts = stored.split(':');
    let algo = parts.next().ok_or(MalformedHash)?;
    let hash = parts.next().ok_or(MalformedHash)?;
    let salt = parts.next().ok_or(MalformedHash)?;
    if algo != HASH_ALGO || parts.next().is_some() {
        return Err(MalformedHash);
    }
    let hash = B64.decode(hash).map_err(|_| MalformedHash)?;
    let salt = B64.decode(salt).map_err(|_| MalformedHash)?;
    Ok((hash, salt))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b) {
        acc |= x ^ y;
    }
    acc == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trip() {
        let stored = hash_password("p");
        assert!(check_password("p", &stored));
        assert!(!check_password("q", &stored));
    }

    #[test]
    fn hash_is_salted() {
        let a = hash_password("same");
        let b = hash_password("same");
        assert_ne!(a, b);
        assert!(check_password("same", &a));
        assert!(check_password("same", &b));
    }

    #[test]
    fn hash_has_three_fields() {
        let stored = hash_password("p");
        let parts: Vec<_> = stored.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "sha512");
    }

    #[test]
    fn malformed_hash_rejected() {
        assert!(!check_password("p", "not-a-hash"));
        assert!(!check_password("p", "md5:AAAA:BBBB"));
        assert!(!check_password("p", "sha512:!!!:???"));
    }

    #[test]
    fn code_is_zero_padded() {
        for _ in 0..200 {
            let code = random_code(6);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn token_is_long_hex() {
        let token = random_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, random_token());
    }

    #[test]
    fn human_code_avoids_ambiguous_glyphs() {
        for _ in 0..100 {
            let code = human_code(10);
            assert_eq!(code.len(), 10);
            for c in code.chars() {
                assert!(HUMAN_ALPHABET.contains(&(c as u8)), "unexpected glyph {c}");
                assert!(!"Il1O0v".contains(c));
            }
        }
    }
}
