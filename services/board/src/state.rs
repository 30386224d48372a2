//! Application state shared across handlers

use std::sync::Arc;

use auth::{
    AdminCredentials, CsrfGuard, PasswordService, RateLimiter, SessionManager, TokenCodec,
};
use common::BoardConfig;

use crate::jobs::JobService;
use crate::lifecycle::LifecyclePolicy;
use crate::payment::PaymentProvider;
use crate::repositories::Repositories;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BoardConfig>,
    pub sessions: SessionManager,
    pub csrf: CsrfGuard,
    pub passwords: PasswordService,
    pub admin: AdminCredentials,
    pub login_limiter: RateLimiter,
    pub repositories: Repositories,
    pub jobs: JobService,
}

impl AppState {
    /// Wire every component from one configuration
    pub fn new(
        config: BoardConfig,
        repositories: Repositories,
        payments: Arc<dyn PaymentProvider>,
    ) -> Self {
        let codec = TokenCodec::new(&config.secret_key);
        let admin = AdminCredentials::new(
            &config.admin_username,
            config.admin_password.as_deref(),
            config.admin_password_hash.as_deref(),
            config.legacy_plaintext_admin,
        );
        let jobs = JobService::new(LifecyclePolicy::from_config(&config), &repositories, payments);

        Self {
            sessions: SessionManager::new(codec.clone(), config.cookie_secure),
            csrf: CsrfGuard::new(codec),
            passwords: PasswordService::new(),
            admin,
            login_limiter: RateLimiter::default(),
            repositories,
            jobs,
            config: Arc::new(config),
        }
    }
}
