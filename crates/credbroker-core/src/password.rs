//! Password primitives for broker users.
//!
//! [`PasswordGenerator`] produces the plaintext passwords handed out once per
//! binding. [`PasswordEncoder`] is the one-way function applied before a
//! password is stored; the default [`Argon2Encoder`] emits PHC strings.

use std::sync::{Mutex, PoisonError};

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, RngCore};

use crate::error::UserError;

/// Characters generated passwords are drawn from.
pub const DEFAULT_ALPHABET: &str = "itsarandomcharsencodertext";

/// Length of generated passwords.
pub const DEFAULT_LENGTH: usize = 12;

/// A cryptographically secure random source that can be moved across tasks.
pub trait SecureRandom: RngCore + CryptoRng + Send {}

impl<T: RngCore + CryptoRng + Send> SecureRandom for T {}

/// Random password generator with an injected alphabet, length and source.
pub struct PasswordGenerator {
    alphabet: Vec<char>,
    length: usize,
    rng: Mutex<Box<dyn SecureRandom>>,
}

impl std::fmt::Debug for PasswordGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordGenerator")
            .field("alphabet_len", &self.alphabet.len())
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

impl PasswordGenerator {
    /// Create a generator.
    ///
    /// # Errors
    ///
    /// Returns `UserError::InvalidConfig` if the alphabet is empty or the
    /// length is zero.
    pub fn new(
        alphabet: &str,
        length: usize,
        rng: Box<dyn SecureRandom>,
    ) -> Result<Self, UserError> {
        let alphabet: Vec<char> = alphabet.chars().collect();
        if alphabet.is_empty() {
            return Err(UserError::InvalidConfig {
                reason: "password alphabet must not be empty".to_owned(),
            });
        }
        if length == 0 {
            return Err(UserError::InvalidConfig {
                reason: "password length must be at least 1".to_owned(),
            });
        }
        Ok(Self {
            alphabet,
            length,
            rng: Mutex::new(rng),
        })
    }

    /// Default alphabet and length over the operating system CSPRNG.
    #[must_use]
    pub fn os_default() -> Self {
        Self {
            alphabet: DEFAULT_ALPHABET.chars().collect(),
            length: DEFAULT_LENGTH,
            rng: Mutex::new(Box::new(OsRng)),
        }
    }

    /// Characters this generator draws from.
    #[must_use]
    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    /// Generate one password, picking every character independently and
    /// uniformly from the alphabet positions.
    pub fn generate(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..self.length)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect()
    }
}

/// One-way password function.
pub trait PasswordEncoder: Send + Sync {
    /// Hash a plaintext password for storage.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Hashing` if the underlying function fails.
    fn encode(&self, raw: &str) -> Result<String, UserError>;

    /// Check a plaintext password against a stored hash.
    fn verify(&self, raw: &str, encoded: &str) -> bool;
}

/// Argon2id encoder producing PHC-format hashes.
pub struct Argon2Encoder {
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for Argon2Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2Encoder").finish_non_exhaustive()
    }
}

impl Argon2Encoder {
    // Basic auth verifies on every broker request, so the cost stays low.
    const MEMORY_COST_KIB: u32 = 768;
    const ITERATIONS: u32 = 1;
    const PARALLELISM: u32 = 1;

    /// Create an encoder with the broker's Argon2id parameters.
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(
            Self::MEMORY_COST_KIB,
            Self::ITERATIONS,
            Self::PARALLELISM,
            Some(32),
        )
        .unwrap_or_default();
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }
}

impl Default for Argon2Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordEncoder for Argon2Encoder {
    fn encode(&self, raw: &str) -> Result<String, UserError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(raw.as_bytes(), &salt)
            .map_err(|e| UserError::Hashing {
                reason: e.to_string(),
            })?;
        Ok(hash.to_string())
    }

    fn verify(&self, raw: &str, encoded: &str) -> bool {
        PasswordHash::new(encoded)
            .is_ok_and(|parsed| self.argon2.verify_password(raw.as_bytes(), &parsed).is_ok())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn thousand_passwords_have_fixed_shape_and_are_distinct() {
        let generator = PasswordGenerator::os_default();
        let mut seen = HashSet::new();

        for _ in 0..1000 {
            let password = generator.generate();
            assert_eq!(password.chars().count(), DEFAULT_LENGTH);
            assert!(password.chars().all(|c| DEFAULT_ALPHABET.contains(c)));
            seen.insert(password);
        }

        // Over 10^13 possible strings; a collision among 1000 draws is vanishingly rare.
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn seeded_source_is_deterministic() {
        let a = PasswordGenerator::new("xyz", 8, Box::new(StdRng::seed_from_u64(7))).unwrap();
        let b = PasswordGenerator::new("xyz", 8, Box::new(StdRng::seed_from_u64(7))).unwrap();

        let first = a.generate();
        assert_eq!(first, b.generate());
        assert_eq!(first.len(), 8);
        assert!(first.chars().all(|c| "xyz".contains(c)));
    }

    #[test]
    fn empty_alphabet_is_rejected() {
        let result = PasswordGenerator::new("", 12, Box::new(OsRng));
        assert!(matches!(result, Err(UserError::InvalidConfig { .. })));
    }

    #[test]
    fn zero_length_is_rejected() {
        let result = PasswordGenerator::new("abc", 0, Box::new(OsRng));
        assert!(matches!(result, Err(UserError::InvalidConfig { .. })));
    }

    #[test]
    fn argon2_encode_then_verify() {
        let encoder = Argon2Encoder::new();
        let hash = encoder.encode("s3cret").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert_ne!(hash, "s3cret");
        assert!(encoder.verify("s3cret", &hash));
        assert!(!encoder.verify("wrong", &hash));
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        let encoder = Argon2Encoder::new();
        assert!(!encoder.verify("anything", "not-a-phc-string"));
    }
}
