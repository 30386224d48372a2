//! Password hashing and credential checks

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use subtle::ConstantTimeEq;
use tracing::warn;

/// Argon2id password hashing
#[derive(Clone, Default)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    /// Create a password service with the default Argon2id parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a password with a fresh random salt
    pub fn hash(&self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        Ok(hash)
    }

    /// Check a password against a stored digest.
    ///
    /// A digest that does not parse yields `false`.
    pub fn verify(&self, password: &str, digest: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(digest) else {
            return false;
        };

        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

/// How the admin secret is held
#[derive(Clone)]
enum AdminSecret {
    /// Argon2 digest of the admin password
    Hashed(String),
    /// Plaintext password, only with the legacy flag set
    LegacyPlaintext(String),
    /// Nothing usable configured; admin login always fails
    Disabled,
}

/// Configured admin credentials
#[derive(Clone)]
pub struct AdminCredentials {
    username: String,
    secret: AdminSecret,
    passwords: PasswordService,
}

impl AdminCredentials {
    /// Build the admin credentials from configuration values.
    ///
    /// With `legacy_plaintext` the plaintext `password` is compared directly;
    /// otherwise `password_hash` must hold an argon2 digest.
    pub fn new(
        username: &str,
        password: Option<&str>,
        password_hash: Option<&str>,
        legacy_plaintext: bool,
    ) -> Self {
        let secret = match (legacy_plaintext, password, password_hash) {
            (true, Some(password), _) if !password.is_empty() => {
                AdminSecret::LegacyPlaintext(password.to_string())
            }
            (false, _, Some(hash)) if PasswordHash::new(hash).is_ok() => {
                AdminSecret::Hashed(hash.to_string())
            }
            _ => {
                warn!("No usable admin password configured; admin login is disabled");
                AdminSecret::Disabled
            }
        };

        Self {
            username: username.to_string(),
            secret,
            passwords: PasswordService::new(),
        }
    }

    /// Whether any admin login can succeed
    pub fn is_enabled(&self) -> bool {
        !matches!(self.secret, AdminSecret::Disabled)
    }

    /// Check a submitted username and password.
    ///
    /// Both parts are always evaluated so the outcome does not leak which
    /// one was wrong through timing.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let username_ok: bool = username.as_bytes().ct_eq(self.username.as_bytes()).into();

        let password_ok = match &self.secret {
            AdminSecret::Hashed(digest) => self.passwords.verify(password, digest),
            AdminSecret::LegacyPlaintext(expected) => {
                password.as_bytes().ct_eq(expected.as_bytes()).into()
            }
            AdminSecret::Disabled => false,
        };

        username_ok & password_ok
    }
}
