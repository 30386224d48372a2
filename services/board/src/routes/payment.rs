//! Payment provider callbacks

use axum::{Json, body::Bytes, extract::State, http::HeaderMap, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::payment::{SIGNATURE_HEADER, WebhookEvent, verify_webhook_signature};
use crate::state::AppState;

/// Signed event from the payment provider. Confirmed payments publish the
/// job they carry in their metadata; every other event is acknowledged and
/// ignored.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = verify_webhook_signature(
        &body,
        signature,
        &state.config.stripe_webhook_secret,
        Utc::now().timestamp(),
    ) {
        warn!("Rejected payment webhook: {}", e);
        return Err(ApiError::BadRequest("Invalid signature".to_string()));
    }

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|e| {
        warn!("Unreadable payment webhook: {}", e);
        ApiError::BadRequest("Invalid payload".to_string())
    })?;

    match event.job_id() {
        Some(job_id) if event.confirms_payment() => {
            if let Some(job) = state.jobs.confirm_payment(job_id, Utc::now()).await? {
                info!("Payment confirmed for job {} ({})", job.id, event.kind);
            }
        }
        _ => debug!("Ignoring payment webhook event {}", event.kind),
    }

    Ok(Json(json!({ "status": "success" })))
}
