//! Authentication building blocks for the job board
//!
//! Sessions and CSRF protection are stateless: every decision is recomputed
//! from a signed token on each request, so nothing here needs storage or
//! synchronization beyond the login throttle.

pub mod csrf;
pub mod password;
pub mod rate_limiter;
pub mod session;
pub mod token;
pub mod validation;

pub use csrf::CsrfGuard;
pub use password::{AdminCredentials, PasswordService};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use session::{Principal, SessionManager};
pub use token::{TokenCodec, TokenError};
