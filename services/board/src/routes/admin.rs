//! Admin back-office

use axum::{
    Form, Json,
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
use crate::forms::{AdminLoginForm, CategoryForm, EmployerForm, JobForm, TokenForm, text};
use crate::gate::{
    ADMIN_DASHBOARD, ADMIN_LOGIN, Requirement, already_signed_in, csrf_token, redirect_to,
    verified_form,
};
use crate::models::category::slugify;
use crate::models::{JobStatus, NewCategory, NewEmployer};
use crate::state::AppState;

fn limiter_key(username: &str) -> String {
    format!("admin:{}", username)
}

/// Login page
pub async fn login_form(State(state): State<AppState>, jar: CookieJar) -> ApiResult<Response> {
    if let Some(redirect) = already_signed_in(Requirement::Admin, &state.sessions, &jar) {
        return Ok(redirect);
    }

    Ok(Json(json!({ "csrf_token": csrf_token(&state.csrf)? })).into_response())
}

/// Check the admin credentials and start a session
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    form: Result<Form<AdminLoginForm>, FormRejection>,
) -> ApiResult<Response> {
    let form = verified_form(&state.csrf, &headers, form)?;

    if let Some(redirect) = already_signed_in(Requirement::Admin, &state.sessions, &jar) {
        return Ok(redirect);
    }

    let username = form.username.unwrap_or_default();
    let password = form.password.unwrap_or_default();
    let key = limiter_key(&username);

    if state.login_limiter.is_locked(&key).await {
        warn!("Admin login for {} refused while locked", username);
        return Err(ApiError::TooManyRequests);
    }

    if !state.admin.verify(&username, &password) {
        state.login_limiter.record_failure(&key).await;
        warn!("Failed admin login for {}", username);
        return Ok(Json(json!({
            "error": "Invalid credentials",
            "csrf_token": csrf_token(&state.csrf)?,
        }))
        .into_response());
    }

    state.login_limiter.reset(&key).await;
    let jar = state.sessions.create_admin(jar).map_err(|e| {
        error!("Failed to create admin session: {}", e);
        ApiError::InternalServerError
    })?;
    info!("Admin {} signed in", username);

    Ok((jar, redirect_to(ADMIN_DASHBOARD)).into_response())
}

/// Drop the admin cookie
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
) -> ApiResult<Response> {
    verified_form(&state.csrf, &headers, form)?;

    let jar = state.sessions.clear_admin(jar);
    Ok((jar, redirect_to(ADMIN_LOGIN)).into_response())
}

/// Every job plus the employers and categories to assign them to
pub async fn dashboard(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let now = Utc::now();
    let policy = state.jobs.policy();
    let jobs: Vec<_> = state
        .repositories
        .jobs
        .list_all()
        .await?
        .into_iter()
        .map(|job| policy.view(job, now))
        .collect();

    Ok(Json(json!({
        "jobs": jobs,
        "employers": state.repositories.employers.list_all().await?,
        "categories": state.repositories.categories.list_all().await?,
        "csrf_token": csrf_token(&state.csrf)?,
    })))
}

/// New job form
pub async fn new_job_form(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(json!({
        "employers": state.repositories.employers.list_all().await?,
        "categories": state.repositories.categories.list_all().await?,
        "statuses": [JobStatus::Draft, JobStatus::Published],
        "csrf_token": csrf_token(&state.csrf)?,
    })))
}

/// Create a job, as a draft or published straight away
pub async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<JobForm>, FormRejection>,
) -> ApiResult<impl IntoResponse> {
    let form = verified_form(&state.csrf, &headers, form)?;

    let status = form.status()?.unwrap_or(JobStatus::Draft);
    let draft = form.to_draft(&state.config.salary_currency, None)?;
    let now = Utc::now();
    let job = state.jobs.create(draft, status, now).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "job": state.jobs.policy().view(job, now) })),
    ))
}

/// Edit form for one job
pub async fn show_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let job = state.jobs.get(id).await?;

    Ok(Json(json!({
        "job": state.jobs.policy().view(job, Utc::now()),
        "employers": state.repositories.employers.list_all().await?,
        "categories": state.repositories.categories.list_all().await?,
        "csrf_token": csrf_token(&state.csrf)?,
    })))
}

/// Edit fields and, optionally, the status of a job
pub async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    form: Result<Form<JobForm>, FormRejection>,
) -> ApiResult<impl IntoResponse> {
    let form = verified_form(&state.csrf, &headers, form)?;

    let changes = form.to_changes()?;
    let status = form.status()?;
    let now = Utc::now();

    let job = state.jobs.get(id).await?;
    let job = state.jobs.update(&job, &changes, status, now).await?;

    Ok(Json(json!({ "job": state.jobs.policy().view(job, now) })))
}

/// Add a company profile not tied to any account
pub async fn create_employer(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<EmployerForm>, FormRejection>,
) -> ApiResult<impl IntoResponse> {
    let form = verified_form(&state.csrf, &headers, form)?;

    let name = text(&form.name).ok_or_else(|| ApiError::validation("name", "is required"))?;
    let employer = state
        .repositories
        .employers
        .create(&NewEmployer {
            name,
            website: text(&form.website),
            description: text(&form.description),
            account_id: None,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "employer": employer }))))
}

/// Add a category; the slug defaults to one derived from the name
pub async fn create_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<CategoryForm>, FormRejection>,
) -> ApiResult<impl IntoResponse> {
    let form = verified_form(&state.csrf, &headers, form)?;

    let name = text(&form.name).ok_or_else(|| ApiError::validation("name", "is required"))?;
    let slug = slugify(&text(&form.slug).unwrap_or_else(|| name.clone()));
    if slug.is_empty() {
        return Err(ApiError::validation("slug", "must contain letters or digits"));
    }

    let category = state
        .repositories
        .categories
        .create(&NewCategory {
            name,
            slug,
            description: text(&form.description),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "category": category }))))
}
