//! Stateless cookie sessions
//!
//! Admin and employer sessions are independent signed tokens carried in
//! their own cookies. Nothing is stored server-side: a session is valid for
//! as long as its token verifies and is younger than [`SESSION_MAX_AGE`], and
//! logging out only deletes the cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::token::{TokenCodec, TokenError};

/// Cookie carrying the admin session
pub const ADMIN_COOKIE: &str = "admin_session";
/// Cookie carrying the employer session
pub const EMPLOYER_COOKIE: &str = "employer_session";
/// Lifetime of both session kinds, in seconds
pub const SESSION_MAX_AGE: i64 = 3600;

/// Payload of an admin session token
const ADMIN_TAG: &str = "admin";
/// `type` field of an employer session payload
const EMPLOYER_TYPE: &str = "employer";

/// Identity resolved from the request cookies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "account_id", rename_all = "snake_case")]
pub enum Principal {
    Anonymous,
    Admin,
    EmployerAccount(Uuid),
}

/// Employer session payload
#[derive(Debug, Serialize, Deserialize)]
struct EmployerClaims {
    #[serde(rename = "type")]
    kind: String,
    employer_account_id: Uuid,
}

/// Session manager for minting, checking and clearing session cookies
#[derive(Clone)]
pub struct SessionManager {
    codec: TokenCodec,
    secure_cookies: bool,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(codec: TokenCodec, secure_cookies: bool) -> Self {
        Self {
            codec,
            secure_cookies,
        }
    }

    /// Start an admin session
    pub fn create_admin(&self, jar: CookieJar) -> Result<CookieJar, TokenError> {
        info!("Creating admin session");
        let token = self.codec.sign(&ADMIN_TAG)?;
        Ok(jar.add(self.session_cookie(ADMIN_COOKIE, token)))
    }

    /// Whether the jar holds a valid admin session
    pub fn verify_admin(&self, jar: &CookieJar) -> bool {
        self.verify_admin_at(jar, Utc::now())
    }

    /// Whether the jar holds an admin session valid at `now`
    pub fn verify_admin_at(&self, jar: &CookieJar, now: DateTime<Utc>) -> bool {
        let Some(cookie) = jar.get(ADMIN_COOKIE) else {
            return false;
        };

        match self
            .codec
            .verify_at::<String>(cookie.value(), SESSION_MAX_AGE, now)
        {
            Ok(tag) => tag == ADMIN_TAG,
            Err(e) => {
                debug!("Rejected admin session: {}", e);
                false
            }
        }
    }

    /// End the admin session
    pub fn clear_admin(&self, jar: CookieJar) -> CookieJar {
        jar.remove(Cookie::build(ADMIN_COOKIE).path("/"))
    }

    /// Start a session for an employer account
    pub fn create_employer(
        &self,
        jar: CookieJar,
        account_id: Uuid,
    ) -> Result<CookieJar, TokenError> {
        info!("Creating employer session for account: {}", account_id);
        let claims = EmployerClaims {
            kind: EMPLOYER_TYPE.to_string(),
            employer_account_id: account_id,
        };
        let token = self.codec.sign(&claims)?;
        Ok(jar.add(self.session_cookie(EMPLOYER_COOKIE, token)))
    }

    /// Account id of a valid employer session, if any
    pub fn verify_employer(&self, jar: &CookieJar) -> Option<Uuid> {
        self.verify_employer_at(jar, Utc::now())
    }

    /// Account id of an employer session valid at `now`, if any
    pub fn verify_employer_at(&self, jar: &CookieJar, now: DateTime<Utc>) -> Option<Uuid> {
        let cookie = jar.get(EMPLOYER_COOKIE)?;

        match self
            .codec
            .verify_at::<EmployerClaims>(cookie.value(), SESSION_MAX_AGE, now)
        {
            Ok(claims) if claims.kind == EMPLOYER_TYPE => Some(claims.employer_account_id),
            Ok(claims) => {
                debug!("Rejected employer session with type {:?}", claims.kind);
                None
            }
            Err(e) => {
                debug!("Rejected employer session: {}", e);
                None
            }
        }
    }

    /// End the employer session
    pub fn clear_employer(&self, jar: CookieJar) -> CookieJar {
        jar.remove(Cookie::build(EMPLOYER_COOKIE).path("/"))
    }

    /// Resolve the principal for pages open to everyone.
    ///
    /// An admin session wins over an employer session.
    pub fn resolve(&self, jar: &CookieJar) -> Principal {
        if self.verify_admin(jar) {
            Principal::Admin
        } else if let Some(account_id) = self.verify_employer(jar) {
            Principal::EmployerAccount(account_id)
        } else {
            Principal::Anonymous
        }
    }

    fn session_cookie(&self, name: &'static str, token: String) -> Cookie<'static> {
        Cookie::build((name, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies)
            .max_age(time::Duration::seconds(SESSION_MAX_AGE))
            .build()
    }
}
