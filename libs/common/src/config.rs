//! Process-wide configuration for the job board
//!
//! The configuration is loaded once at start-up from built-in defaults
//! overlaid by environment variables (case-insensitive, e.g. `SECRET_KEY`,
//! `JOB_EXPIRY_DAYS`) and then handed to each component explicitly.

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use tracing::warn;

/// Signing key used when none is configured. Start-up warns about it.
pub const DEFAULT_SECRET_KEY: &str = "change-me-in-production";

/// Which persistence backend the board runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// PostgreSQL through sqlx
    Postgres,
    /// Process-local tables, lost on restart
    Memory,
}

/// Board configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    /// Key for signing session and CSRF tokens
    pub secret_key: String,
    /// Admin login name
    pub admin_username: String,
    /// Plaintext admin password, only honoured with `legacy_plaintext_admin`
    pub admin_password: Option<String>,
    /// Argon2 PHC string for the admin password
    pub admin_password_hash: Option<String>,
    /// Compare the admin password in clear instead of against a hash
    pub legacy_plaintext_admin: bool,
    /// Days a published job stays listed
    pub job_expiry_days: i64,
    /// Hours after publication during which the employer may ask for a refund
    pub refund_window_hours: i64,
    /// Require both salary bounds on new jobs
    pub salary_range_required: bool,
    /// Cap on jobs per employer account, unlimited when unset
    pub max_jobs_per_employer: Option<u32>,
    /// Allow employers to sign themselves up
    pub employer_registration_enabled: bool,
    /// Allow employers to edit their own postings
    pub job_editing_enabled: bool,
    /// Price of one posting in minor currency units
    pub job_post_price: i64,
    /// Default currency for salaries and payments
    pub salary_currency: String,
    /// Mark session cookies `Secure`
    pub cookie_secure: bool,
    /// Absolute base URL used in the sitemap and checkout redirects
    pub public_base_url: String,
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Persistence backend
    pub storage: StorageBackend,
    /// Stripe API secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// Stripe price identifier for one posting
    pub stripe_price_id: String,
    /// Stripe API base URL
    pub stripe_api_base: String,
}

impl BoardConfig {
    /// Load the configuration from defaults and the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Configuration made of the built-in defaults only
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("secret_key", DEFAULT_SECRET_KEY)?
            .set_default("admin_username", "admin")?
            .set_default("legacy_plaintext_admin", false)?
            .set_default("job_expiry_days", 30)?
            .set_default("refund_window_hours", 4)?
            .set_default("salary_range_required", true)?
            .set_default("employer_registration_enabled", true)?
            .set_default("job_editing_enabled", true)?
            .set_default("job_post_price", 1000)?
            .set_default("salary_currency", "USD")?
            .set_default("cookie_secure", false)?
            .set_default("public_base_url", "http://localhost:8000")?
            .set_default("bind_address", "0.0.0.0:8000")?
            .set_default("storage", "postgres")?
            .set_default("stripe_secret_key", "sk_test_placeholder")?
            .set_default("stripe_webhook_secret", "whsec_placeholder")?
            .set_default("stripe_price_id", "price_placeholder")?
            .set_default("stripe_api_base", "https://api.stripe.com")
    }

    /// Log the settings that are unsafe outside development
    pub fn warn_insecure_defaults(&self) {
        if self.secret_key == DEFAULT_SECRET_KEY {
            warn!("SECRET_KEY is the built-in default; sessions can be forged");
        }
        if self.legacy_plaintext_admin {
            warn!("Admin password is compared in plaintext (LEGACY_PLAINTEXT_ADMIN=true)");
        }
        if self.storage == StorageBackend::Memory {
            warn!("Using in-memory storage; all data is lost on restart");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = BoardConfig::defaults().unwrap();
        assert_eq!(config.secret_key, DEFAULT_SECRET_KEY);
        assert_eq!(config.admin_username, "admin");
        assert_eq!(config.admin_password, None);
        assert!(!config.legacy_plaintext_admin);
        assert_eq!(config.job_expiry_days, 30);
        assert_eq!(config.refund_window_hours, 4);
        assert!(config.salary_range_required);
        assert_eq!(config.max_jobs_per_employer, None);
        assert_eq!(config.storage, StorageBackend::Postgres);
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        unsafe {
            std::env::set_var("JOB_EXPIRY_DAYS", "14");
            std::env::set_var("MAX_JOBS_PER_EMPLOYER", "3");
            std::env::set_var("STORAGE", "memory");
            std::env::set_var("SALARY_RANGE_REQUIRED", "false");
        }

        let config = BoardConfig::from_env().unwrap();
        assert_eq!(config.job_expiry_days, 14);
        assert_eq!(config.max_jobs_per_employer, Some(3));
        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(!config.salary_range_required);

        unsafe {
            std::env::remove_var("JOB_EXPIRY_DAYS");
            std::env::remove_var("MAX_JOBS_PER_EMPLOYER");
            std::env::remove_var("STORAGE");
            std::env::remove_var("SALARY_RANGE_REQUIRED");
        }
    }
}
