//! Payment collection
//!
//! Checkout is started through a [`PaymentProvider`]; completion arrives
//! later as a signed webhook whose event names the job in its metadata.

use std::time::Duration;

use async_trait::async_trait;
use common::BoardConfig;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";
/// Largest accepted distance between the signature timestamp and now, in seconds
pub const SIGNATURE_TOLERANCE: i64 = 300;
/// Webhook events that confirm a payment
pub const PAYMENT_EVENTS: [&str; 2] = ["payment_intent.succeeded", "checkout.session.completed"];

/// Payment errors
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Request to payment provider failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Payment provider answered {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected payment provider response: {0}")]
    InvalidResponse(String),
}

/// Webhook authentication failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Malformed signature header")]
    MalformedHeader,

    #[error("Signature timestamp outside tolerance")]
    StaleTimestamp,

    #[error("Signature mismatch")]
    SignatureMismatch,
}

/// A started checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    /// Provider-side identifier, stored on the job
    pub reference: String,
    /// Where to send the employer to pay
    pub checkout_url: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Start collecting `amount` minor units for `job_id`
    async fn initiate(&self, job_id: Uuid, amount: i64) -> Result<PaymentSession, PaymentError>;
}

/// Stripe Checkout over its REST API
#[derive(Clone)]
pub struct StripeCheckout {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    price_id: String,
    currency: String,
    public_base_url: String,
}

#[derive(Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: String,
}

impl StripeCheckout {
    pub fn from_config(config: &BoardConfig) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: config.stripe_api_base.trim_end_matches('/').to_string(),
            secret_key: config.stripe_secret_key.clone(),
            price_id: config.stripe_price_id.clone(),
            currency: config.salary_currency.to_ascii_lowercase(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn form(&self, job_id: Uuid, amount: i64) -> Vec<(&'static str, String)> {
        let payment_page = format!("{}/employer/jobs/{}/payment", self.public_base_url, job_id);
        let mut form = vec![
            ("mode", "payment".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", format!("{}?status=success", payment_page)),
            ("cancel_url", format!("{}?status=cancelled", payment_page)),
            ("metadata[job_id]", job_id.to_string()),
            ("payment_intent_data[metadata][job_id]", job_id.to_string()),
        ];

        if self.price_id.is_empty() {
            form.extend([
                ("line_items[0][price_data][currency]", self.currency.clone()),
                ("line_items[0][price_data][unit_amount]", amount.to_string()),
                (
                    "line_items[0][price_data][product_data][name]",
                    "Job posting".to_string(),
                ),
            ]);
        } else {
            form.push(("line_items[0][price]", self.price_id.clone()));
        }

        form
    }
}

#[async_trait]
impl PaymentProvider for StripeCheckout {
    async fn initiate(&self, job_id: Uuid, amount: i64) -> Result<PaymentSession, PaymentError> {
        debug!("Creating checkout session for job {}", job_id);

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&self.form(job_id, amount))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| "no error message".to_string());
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let session: CheckoutSessionResponse = response.json().await?;
        let checkout_url = session.url.ok_or_else(|| {
            PaymentError::InvalidResponse("checkout session without url".to_string())
        })?;

        info!("Created checkout session {} for job {}", session.id, job_id);

        Ok(PaymentSession {
            reference: session.id,
            checkout_url,
        })
    }
}

/// Webhook event envelope
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// Whether the event confirms a payment
    pub fn confirms_payment(&self) -> bool {
        PAYMENT_EVENTS.contains(&self.kind.as_str())
    }

    /// Job named in `data.object.metadata.job_id`
    pub fn job_id(&self) -> Option<Uuid> {
        self.data
            .object
            .get("metadata")?
            .get("job_id")?
            .as_str()?
            .parse()
            .ok()
    }
}

/// Check a `t=<unix>,v1=<hex>` signature header over `payload`
pub fn verify_webhook_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    now: i64,
) -> Result<(), WebhookError> {
    let header = header.ok_or(WebhookError::MissingSignature)?;

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| WebhookError::MalformedHeader)?,
                );
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE {
        return Err(WebhookError::StaleTimestamp);
    }

    let mac = signed_payload_mac(payload, secret, timestamp)
        .ok_or(WebhookError::SignatureMismatch)?;
    let matched = signatures.into_iter().any(|signature| {
        hex::decode(signature).is_ok_and(|bytes| mac.clone().verify_slice(&bytes).is_ok())
    });

    if matched {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

/// Build the signature header a provider would send for `payload`
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> Option<String> {
    let digest = signed_payload_mac(payload, secret, timestamp)?
        .finalize()
        .into_bytes();
    Some(format!("t={},v1={}", timestamp, hex::encode(digest)))
}

fn signed_payload_mac(payload: &[u8], secret: &str, timestamp: i64) -> Option<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(mac)
}
