//! Argon2id hashing for credential storage.
//!
//! Plaintext passwords only ever travel inside the [`Password`] newtype,
//! whose `Debug` output is redacted so a stray `{:?}` in a log line cannot
//! leak credential material.

use std::fmt;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// A plaintext password in transit between a request and the hasher.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// A PHC-format Argon2 hash string, safe to persist and log.
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

/// Hash a password with Argon2id and a fresh random salt. The salt and the
/// cost parameters are carried inside the PHC string, so verification needs
/// no extra state.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;

    Ok(PasswordHashString::new(hash.to_string()))
}

/// Check a password against a stored hash. A malformed stored hash and a
/// mismatch both come back as errors; callers must not tell the two apart
/// in anything they return to a client.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<(), anyhow::Error> {
    let parsed = PasswordHash::new(password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Stored password hash is malformed: {}", e))?;

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed)
        .map_err(|_| anyhow::anyhow!("Password verification failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_phc_argon2() {
        let password = Password::new("myS3curePassword!".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2"));
    }

    #[test]
    fn test_round_trip_and_rejection() {
        let password = Password::new("myS3curePassword!".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(verify_password(&password, &hash).is_ok());

        let wrong = Password::new("wrongPassword".to_string());
        assert!(verify_password(&wrong, &hash).is_err());
    }

    #[test]
    fn test_salting_yields_distinct_hashes() {
        let password = Password::new("myS3curePassword!".to_string());
        let hash1 = hash_password(&password).expect("Failed to hash password");
        let hash2 = hash_password(&password).expect("Failed to hash password");

        assert_ne!(hash1.as_str(), hash2.as_str());
        assert!(verify_password(&password, &hash2).is_ok());
    }

    #[test]
    fn test_debug_redacts_plaintext() {
        let password = Password::new("myS3curePassword!".to_string());
        let rendered = format!("{:?}", password);

        assert!(!rendered.contains("myS3curePassword"));
        assert!(rendered.contains("redacted"));
    }
}
