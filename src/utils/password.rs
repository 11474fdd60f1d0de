//! Password hashing and strength scoring.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use serde::Serialize;

/// Newtype for password to prevent accidental logging
#[derive(Debug, Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Argon2id cost parameters. The defaults follow the argon2 crate's
/// recommended parameters; production deployments tune these via config.
#[derive(Debug, Clone)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

fn argon2(config: &HashingConfig) -> Result<Argon2<'static>, anyhow::Error> {
    let params = Params::new(
        config.memory_kib,
        config.iterations,
        config.parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid argon2 parameters: {}", e))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password using Argon2id with a fresh random salt.
pub fn hash_password(
    password: &Password,
    config: &HashingConfig,
) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = argon2(config)?;
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash.
///
/// Returns `Ok(true)` on match, `Ok(false)` on mismatch; only errors if the
/// stored hash itself is malformed or missing.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<bool, anyhow::Error> {
    if password_hash.as_str().is_empty() {
        return Err(anyhow::anyhow!("No password hash stored"));
    }

    let parsed_hash = PasswordHash::new(password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .is_ok())
}

/// Strength band derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrengthBand {
    Weak,
    Fair,
    Good,
    Strong,
    VeryStrong,
}

/// Per-requirement breakdown of a strength check.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StrengthRequirements {
    pub min_length: bool,
    pub uppercase: bool,
    pub lowercase: bool,
    pub digit: bool,
    pub special: bool,
    pub not_common: bool,
}

/// Result of a strength check, including actionable feedback.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordStrength {
    pub score: u32,
    pub band: StrengthBand,
    pub requirements: StrengthRequirements,
    pub feedback: Vec<String>,
}

impl PasswordStrength {
    pub fn is_weak(&self) -> bool {
        self.band == StrengthBand::Weak
    }
}

const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "123456",
    "12345678",
    "123456789",
    "qwerty",
    "abc123",
    "letmein",
    "welcome",
    "admin",
    "iloveyou",
    "monkey",
    "dragon",
    "111111",
    "sunshine",
    "princess",
];

/// Deterministic password strength scoring.
///
/// Length: +20 at >=8 chars, +10 more at >=12, +10 more at >=16.
/// Character classes: +15 each for uppercase, lowercase, digit, special.
/// +10 if not on the common-password denylist.
pub fn password_strength(candidate: &str) -> PasswordStrength {
    let mut score: u32 = 0;
    let mut feedback = Vec::new();

    let len = candidate.chars().count();
    let min_length = len >= 8;
    if min_length {
        score += 20;
        if len >= 12 {
            score += 10;
        }
        if len >= 16 {
            score += 10;
        }
    } else {
        feedback.push("Use at least 8 characters".to_string());
    }

    let uppercase = candidate.chars().any(|c| c.is_ascii_uppercase());
    let lowercase = candidate.chars().any(|c| c.is_ascii_lowercase());
    let digit = candidate.chars().any(|c| c.is_ascii_digit());
    let special = candidate.chars().any(|c| !c.is_alphanumeric());

    if uppercase {
        score += 15;
    } else {
        feedback.push("Add an uppercase letter".to_string());
    }
    if lowercase {
        score += 15;
    } else {
        feedback.push("Add a lowercase letter".to_string());
    }
    if digit {
        score += 15;
    } else {
        feedback.push("Add a digit".to_string());
    }
    if special {
        score += 15;
    } else {
        feedback.push("Add a special character".to_string());
    }

    let not_common = !COMMON_PASSWORDS.contains(&candidate.to_lowercase().as_str());
    if not_common {
        score += 10;
    } else {
        feedback.push("Avoid commonly used passwords".to_string());
    }

    let band = match score {
        0..=39 => StrengthBand::Weak,
        40..=59 => StrengthBand::Fair,
        60..=79 => StrengthBand::Good,
        80..=89 => StrengthBand::Strong,
        _ => StrengthBand::VeryStrong,
    };

    PasswordStrength {
        score,
        band,
        requirements: StrengthRequirements {
            min_length,
            uppercase,
            lowercase,
            digit,
            special,
            not_common,
        },
        feedback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password, &HashingConfig::default()).unwrap();

        assert!(!hash.as_str().is_empty());
        assert!(hash.as_str().starts_with("$argon2"));
    }

    #[test]
    fn test_verify_password_correct() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password, &HashingConfig::default()).unwrap();

        assert!(verify_password(&password, &hash).unwrap());
    }

    #[test]
    fn test_verify_password_incorrect() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password, &HashingConfig::default()).unwrap();

        let wrong = Password::new("wrongPassword".to_string());
        assert!(!verify_password(&wrong, &hash).unwrap());
    }

    #[test]
    fn test_missing_hash_is_an_error() {
        let password = Password::new("whatever".to_string());
        let empty = PasswordHashString::new(String::new());
        assert!(verify_password(&password, &empty).is_err());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let config = HashingConfig::default();
        let hash1 = hash_password(&password, &config).unwrap();
        let hash2 = hash_password(&password, &config).unwrap();

        assert_ne!(hash1.as_str(), hash2.as_str());
        assert!(verify_password(&password, &hash1).unwrap());
        assert!(verify_password(&password, &hash2).unwrap());
    }

    #[test]
    fn common_password_is_weak() {
        // "password": +20 length, +15 lowercase, denylisted.
        let strength = password_strength("password");
        assert_eq!(strength.score, 35);
        assert_eq!(strength.band, StrengthBand::Weak);
        assert!(!strength.requirements.not_common);
        assert!(strength.is_weak());
    }

    #[test]
    fn mixed_long_password_is_very_strong() {
        let strength = password_strength("Tr0ub4dor&3!XY");
        assert_eq!(strength.score, 100);
        assert_eq!(strength.band, StrengthBand::VeryStrong);
        assert!(strength.feedback.is_empty());
    }

    #[test]
    fn short_password_gets_length_feedback() {
        // All four character classes without any length bonus: 70, good.
        let strength = password_strength("Ab1!");
        assert_eq!(strength.score, 70);
        assert_eq!(strength.band, StrengthBand::Good);
        assert!(!strength.requirements.min_length);
        assert!(strength
            .feedback
            .iter()
            .any(|f| f.contains("at least 8 characters")));
    }

    #[test]
    fn band_boundaries() {
        // 20 length + 15 lowercase + 10 not-common = 45: fair.
        let fair = password_strength("abcdefgh");
        assert_eq!(fair.score, 45);
        assert_eq!(fair.band, StrengthBand::Fair);

        // +15 digit on top = 60: good.
        let good = password_strength("abcdefgh1");
        assert_eq!(good.score, 60);
        assert_eq!(good.band, StrengthBand::Good);

        // 30 length + three classes + not-common = 85: strong.
        let strong = password_strength("Abcdefghijk1");
        assert_eq!(strong.score, 85);
        assert_eq!(strong.band, StrengthBand::Strong);
    }
}
