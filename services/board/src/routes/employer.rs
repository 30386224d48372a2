//! Employer self-service

use auth::validation::{normalize_email, validate_email, validate_name, validate_password};
use axum::{
    Extension, Form, Json,
    extract::{Path, State, rejection::FormRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::forms::{EmployerLoginForm, JobForm, RefundForm, RegisterForm, TokenForm, text};
use crate::gate::{
    EMPLOYER_DASHBOARD, EmployerAccountId, Requirement, already_signed_in, csrf_token,
    redirect_to, verified_form,
};
use crate::models::{JobStatus, NewEmployer, NewEmployerAccount};
use crate::state::AppState;

fn limiter_key(email: &str) -> String {
    format!("employer:{}", email)
}

fn start_session(state: &AppState, jar: CookieJar, account_id: Uuid) -> ApiResult<Response> {
    let jar = state.sessions.create_employer(jar, account_id).map_err(|e| {
        error!("Failed to create employer session: {}", e);
        ApiError::InternalServerError
    })?;

    Ok((jar, redirect_to(EMPLOYER_DASHBOARD)).into_response())
}

/// Registration page, absent when self sign-up is off
pub async fn register_form(State(state): State<AppState>, jar: CookieJar) -> ApiResult<Response> {
    if !state.config.employer_registration_enabled {
        return Err(ApiError::NotFound);
    }
    if let Some(redirect) = already_signed_in(Requirement::Employer, &state.sessions, &jar) {
        return Ok(redirect);
    }

    Ok(Json(json!({ "csrf_token": csrf_token(&state.csrf)? })).into_response())
}

/// Create an account and its company profile, then sign the account in
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    form: Result<Form<RegisterForm>, FormRejection>,
) -> ApiResult<Response> {
    let form = verified_form(&state.csrf, &headers, form)?;

    if !state.config.employer_registration_enabled {
        return Err(ApiError::NotFound);
    }
    if let Some(redirect) = already_signed_in(Requirement::Employer, &state.sessions, &jar) {
        return Ok(redirect);
    }

    let email = normalize_email(form.email.as_deref().unwrap_or_default());
    validate_email(&email).map_err(|e| ApiError::validation("email", e))?;
    let password = form.password.unwrap_or_default();
    validate_password(&password).map_err(|e| ApiError::validation("password", e))?;
    let company_name = text(&form.company_name).unwrap_or_default();
    validate_name("Company name", &company_name)
        .map_err(|e| ApiError::validation("company_name", e))?;
    let contact_name = text(&form.contact_name).unwrap_or_default();
    validate_name("Contact name", &contact_name)
        .map_err(|e| ApiError::validation("contact_name", e))?;

    let password_hash = state.passwords.hash(&password).map_err(|e| {
        error!("Failed to hash password: {}", e);
        ApiError::InternalServerError
    })?;

    let website = text(&form.website);
    let account = state
        .repositories
        .accounts
        .create(&NewEmployerAccount {
            email,
            password_hash,
            company_name: company_name.clone(),
            contact_name,
            phone: text(&form.phone),
            website: website.clone(),
        })
        .await?;

    state
        .repositories
        .employers
        .create(&NewEmployer {
            name: company_name,
            website,
            description: None,
            account_id: Some(account.id),
        })
        .await?;

    info!("Registered employer account {}", account.id);
    start_session(&state, jar, account.id)
}

/// Login page
pub async fn login_form(State(state): State<AppState>, jar: CookieJar) -> ApiResult<Response> {
    if let Some(redirect) = already_signed_in(Requirement::Employer, &state.sessions, &jar) {
        return Ok(redirect);
    }

    Ok(Json(json!({ "csrf_token": csrf_token(&state.csrf)? })).into_response())
}

/// Check an account's credentials and start a session
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    form: Result<Form<EmployerLoginForm>, FormRejection>,
) -> ApiResult<Response> {
    let form = verified_form(&state.csrf, &headers, form)?;

    if let Some(redirect) = already_signed_in(Requirement::Employer, &state.sessions, &jar) {
        return Ok(redirect);
    }

    let email = normalize_email(form.email.as_deref().unwrap_or_default());
    let password = form.password.unwrap_or_default();
    let key = limiter_key(&email);

    if state.login_limiter.is_locked(&key).await {
        warn!("Employer login for {} refused while locked", email);
        return Err(ApiError::TooManyRequests);
    }

    let account = state
        .repositories
        .accounts
        .find_by_email(&email)
        .await?
        .filter(|account| account.is_active)
        .filter(|account| state.passwords.verify(&password, &account.password_hash));

    let Some(account) = account else {
        state.login_limiter.record_failure(&key).await;
        warn!("Failed employer login for {}", email);
        return Ok(Json(json!({
            "error": "Invalid email or password",
            "csrf_token": csrf_token(&state.csrf)?,
        }))
        .into_response());
    };

    state.login_limiter.reset(&key).await;
    state
        .repositories
        .accounts
        .record_login(account.id, Utc::now())
        .await?;
    info!("Employer account {} signed in", account.id);

    start_session(&state, jar, account.id)
}

/// Drop the employer cookie
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
) -> ApiResult<Response> {
    verified_form(&state.csrf, &headers, form)?;

    let jar = state.sessions.clear_employer(jar);
    Ok((jar, redirect_to("/")).into_response())
}

/// The account, its company profiles and its jobs
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(EmployerAccountId(account_id)): Extension<EmployerAccountId>,
) -> ApiResult<impl IntoResponse> {
    let account = state
        .repositories
        .accounts
        .find_by_id(account_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let now = Utc::now();
    let policy = state.jobs.policy();
    let jobs: Vec<_> = state
        .repositories
        .jobs
        .list_for_account(account_id)
        .await?
        .into_iter()
        .map(|job| policy.view(job, now))
        .collect();

    Ok(Json(json!({
        "account": account,
        "employers": state.repositories.employers.list_for_account(account_id).await?,
        "jobs": jobs,
        "csrf_token": csrf_token(&state.csrf)?,
    })))
}

/// New job form
pub async fn new_job_form(
    State(state): State<AppState>,
    Extension(EmployerAccountId(account_id)): Extension<EmployerAccountId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(json!({
        "employers": state.repositories.employers.list_for_account(account_id).await?,
        "categories": state.repositories.categories.list_all().await?,
        "csrf_token": csrf_token(&state.csrf)?,
    })))
}

/// Create a draft job; it is published once paid for
pub async fn create_job(
    State(state): State<AppState>,
    Extension(EmployerAccountId(account_id)): Extension<EmployerAccountId>,
    headers: HeaderMap,
    form: Result<Form<JobForm>, FormRejection>,
) -> ApiResult<impl IntoResponse> {
    let form = verified_form(&state.csrf, &headers, form)?;

    let mut draft = form.to_draft(&state.config.salary_currency, Some(account_id))?;
    if draft.employer_id.is_none() {
        draft.employer_id = state
            .repositories
            .employers
            .list_for_account(account_id)
            .await?
            .first()
            .map(|employer| employer.id);
    }

    let now = Utc::now();
    let job = state.jobs.create(draft, JobStatus::Draft, now).await?;
    let payment_url = format!("/employer/jobs/{}/payment", job.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "job": state.jobs.policy().view(job, now),
            "payment_url": payment_url,
        })),
    ))
}

/// One of the account's jobs
pub async fn show_job(
    State(state): State<AppState>,
    Extension(EmployerAccountId(account_id)): Extension<EmployerAccountId>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let job = state.jobs.get_owned(id, account_id).await?;

    Ok(Json(json!({
        "job": state.jobs.policy().view(job, Utc::now()),
        "editing_enabled": state.config.job_editing_enabled,
        "csrf_token": csrf_token(&state.csrf)?,
    })))
}

/// Edit the listing text of one of the account's jobs
pub async fn update_job(
    State(state): State<AppState>,
    Extension(EmployerAccountId(account_id)): Extension<EmployerAccountId>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    form: Result<Form<JobForm>, FormRejection>,
) -> ApiResult<impl IntoResponse> {
    let form = verified_form(&state.csrf, &headers, form)?;

    if !state.config.job_editing_enabled {
        return Err(ApiError::Forbidden);
    }

    let mut changes = form.to_changes()?;
    // Employers cannot move a job to another profile or extend it
    changes.employer_id = None;
    changes.expires_at = None;

    let job = state.jobs.get_owned(id, account_id).await?;
    let job = state.jobs.edit(&job, &changes).await?;

    Ok(Json(json!({ "job": state.jobs.policy().view(job, Utc::now()) })))
}

/// Price and state of payment for one job
pub async fn payment_page(
    State(state): State<AppState>,
    Extension(EmployerAccountId(account_id)): Extension<EmployerAccountId>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let job = state.jobs.get_owned(id, account_id).await?;

    Ok(Json(json!({
        "job": state.jobs.policy().view(job, Utc::now()),
        "amount": state.config.job_post_price,
        "currency": state.config.salary_currency,
        "csrf_token": csrf_token(&state.csrf)?,
    })))
}

/// Start a checkout for a draft job
pub async fn checkout(
    State(state): State<AppState>,
    Extension(EmployerAccountId(account_id)): Extension<EmployerAccountId>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
) -> ApiResult<impl IntoResponse> {
    verified_form(&state.csrf, &headers, form)?;

    let job = state.jobs.get_owned(id, account_id).await?;
    let session = state
        .jobs
        .start_checkout(&job, state.config.job_post_price)
        .await?;

    Ok(Json(json!({
        "reference": session.reference,
        "checkout_url": session.checkout_url,
    })))
}

/// Refund a job inside its refund window
pub async fn refund(
    State(state): State<AppState>,
    Extension(EmployerAccountId(account_id)): Extension<EmployerAccountId>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    form: Result<Form<RefundForm>, FormRejection>,
) -> ApiResult<impl IntoResponse> {
    let form = verified_form(&state.csrf, &headers, form)?;

    let now = Utc::now();
    let job = state
        .jobs
        .request_refund(id, account_id, text(&form.reason), now)
        .await?;

    Ok(Json(json!({ "job": state.jobs.policy().view(job, now) })))
}
