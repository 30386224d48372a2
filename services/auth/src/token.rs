//! Signed, time-limited tokens
//!
//! This module wraps `jsonwebtoken` (HS256) into a small codec that turns any
//! serializable payload into an opaque, tamper-evident string carrying its
//! issue time. Expiry is decided at verification time from the issue time and
//! the caller's `max_age`, so one token can be checked against any window.

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Why a token was rejected
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Not a token this codec produced, or the payload has the wrong shape
    #[error("malformed token")]
    Malformed,
    /// Signature does not match the configured secret
    #[error("token signature mismatch")]
    BadSignature,
    /// Older than the allowed age, or issued in the future
    #[error("token expired")]
    Expired,
    /// The payload could not be signed
    #[error("failed to encode token")]
    Encoding,
}

/// Claims wrapped around every payload
#[derive(Debug, Serialize, Deserialize)]
struct SignedClaims<T> {
    /// Issue time, seconds since the epoch
    iat: i64,
    /// Caller payload
    data: T,
}

/// Token codec keyed by the process-wide secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    /// Create a codec for the given secret
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign a payload stamped with the current time
    pub fn sign<T: Serialize>(&self, payload: &T) -> Result<String, TokenError> {
        self.sign_at(payload, Utc::now())
    }

    /// Sign a payload stamped with `issued_at`
    pub fn sign_at<T: Serialize>(
        &self,
        payload: &T,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = SignedClaims {
            iat: issued_at.timestamp(),
            data: payload,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| TokenError::Encoding)
    }

    /// Verify a token against the current time
    pub fn verify<T: DeserializeOwned>(&self, token: &str, max_age: i64) -> Result<T, TokenError> {
        self.verify_at(token, max_age, Utc::now())
    }

    /// Verify a token as of `now`: the signature must match and
    /// `0 <= now - issued_at <= max_age` must hold.
    pub fn verify_at<T: DeserializeOwned>(
        &self,
        token: &str,
        max_age: i64,
        now: DateTime<Utc>,
    ) -> Result<T, TokenError> {
        if token.is_empty() {
            return Err(TokenError::Malformed);
        }

        let data = decode::<SignedClaims<T>>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            })?;

        let age = now.timestamp() - data.claims.iat;
        if age < 0 || age > max_age {
            return Err(TokenError::Expired);
        }

        Ok(data.claims.data)
    }
}
