//! CSRF tokens
//!
//! Tokens are signed nonces valid for [`CSRF_MAX_AGE`] seconds. They are not
//! bound to a session, a form, or a single use: any token this process minted
//! within the last hour passes [`CsrfGuard::verify`].

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::token::{TokenCodec, TokenError};

/// Form field carrying the token
pub const CSRF_FIELD: &str = "csrf_token";
/// Request and response header carrying the token
pub const CSRF_HEADER: &str = "x-csrf-token";
/// Lifetime of a CSRF token, in seconds
pub const CSRF_MAX_AGE: i64 = 3600;

#[derive(Debug, Serialize, Deserialize)]
struct CsrfClaims {
    nonce: String,
}

/// CSRF token issuer and checker
#[derive(Clone)]
pub struct CsrfGuard {
    codec: TokenCodec,
}

impl CsrfGuard {
    /// Create a guard signing with the given codec
    pub fn new(codec: TokenCodec) -> Self {
        Self { codec }
    }

    /// Mint a fresh token
    pub fn generate(&self) -> Result<String, TokenError> {
        let claims = CsrfClaims {
            nonce: Uuid::new_v4().simple().to_string(),
        };
        self.codec.sign(&claims)
    }

    /// Whether `token` is a token minted within the last hour
    pub fn verify(&self, token: Option<&str>) -> bool {
        self.verify_at(token, Utc::now())
    }

    /// Whether `token` was minted within the hour before `now`
    pub fn verify_at(&self, token: Option<&str>, now: DateTime<Utc>) -> bool {
        match token {
            Some(token) if !token.is_empty() => self
                .codec
                .verify_at::<CsrfClaims>(token, CSRF_MAX_AGE, now)
                .is_ok(),
            _ => false,
        }
    }
}

/// Pick the submitted token: the form field first, then the request header
pub fn extract_token(form_value: Option<&str>, headers: &HeaderMap) -> Option<String> {
    form_value
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| {
            headers
                .get(CSRF_HEADER)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        })
}
