//! Public pages

use auth::Principal;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::forms::text;
use crate::gate::Requirement;
use crate::models::{JobSearch, JobStatus, JobView};
use crate::state::AppState;

const FEED_LIMIT: usize = 50;

/// Query string of `/search`
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    /// Category slug
    pub category: Option<String>,
    /// Comma-separated tags that must all match
    pub tags: Option<String>,
}

async fn listed_jobs(state: &AppState, search: &JobSearch) -> ApiResult<Vec<JobView>> {
    let now = Utc::now();
    let jobs = state.repositories.jobs.list_public(search, now).await?;
    let policy = state.jobs.policy();

    Ok(jobs.into_iter().map(|job| policy.view(job, now)).collect())
}

fn principal(state: &AppState, jar: &CookieJar) -> Principal {
    Requirement::Public.principal(&state.sessions, jar)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "board"
    }))
}

/// Home page: every live job
pub async fn index(State(state): State<AppState>, jar: CookieJar) -> ApiResult<impl IntoResponse> {
    let jobs = listed_jobs(&state, &JobSearch::default()).await?;
    let categories = state.repositories.categories.list_all().await?;

    Ok(Json(json!({
        "principal": principal(&state, &jar),
        "jobs": jobs,
        "categories": categories,
    })))
}

/// Filtered listing
pub async fn search(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<SearchParams>,
) -> ApiResult<impl IntoResponse> {
    let mut search = JobSearch {
        q: text(&params.q),
        category_id: None,
        tags: params
            .tags
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect(),
    };

    let jobs = match text(&params.category) {
        Some(slug) => match state.repositories.categories.find_by_slug(&slug).await? {
            Some(category) => {
                search.category_id = Some(category.id);
                listed_jobs(&state, &search).await?
            }
            None => Vec::new(),
        },
        None => listed_jobs(&state, &search).await?,
    };

    Ok(Json(json!({
        "principal": principal(&state, &jar),
        "query": params.q,
        "category": params.category,
        "tags": search.tags,
        "jobs": jobs,
    })))
}

/// Single job. Drafts and refunded jobs are not public.
pub async fn job_detail(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let job = state.jobs.get(id).await?;
    if matches!(job.status, JobStatus::Draft | JobStatus::Refunded) {
        return Err(ApiError::NotFound);
    }

    let employer = state.repositories.employers.find_by_id(job.employer_id).await?;
    let category = match job.category_id {
        Some(category_id) => state.repositories.categories.find_by_id(category_id).await?,
        None => None,
    };

    Ok(Json(json!({
        "principal": principal(&state, &jar),
        "job": state.jobs.policy().view(job, Utc::now()),
        "employer": employer,
        "category": category,
    })))
}

/// JSON Feed of the newest live jobs
pub async fn feed(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let base = state.config.public_base_url.trim_end_matches('/');
    let jobs = listed_jobs(&state, &JobSearch::default()).await?;

    let items: Vec<_> = jobs
        .iter()
        .take(FEED_LIMIT)
        .map(|view| {
            json!({
                "id": view.job.id,
                "url": format!("{}/jobs/{}", base, view.job.id),
                "title": view.job.title,
                "content_text": view.job.description,
                "date_published": view.job.published_at,
                "tags": view.tag_list,
                "external_url": view.job.apply_url,
            })
        })
        .collect();

    Ok(Json(json!({
        "version": "https://jsonfeed.org/version/1.1",
        "title": "Job Board",
        "home_page_url": base,
        "feed_url": format!("{}/jobs/feed.json", base),
        "items": items,
    })))
}

/// Sitemap of the home page and every live job
pub async fn sitemap(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let base = state.config.public_base_url.trim_end_matches('/');
    let jobs = listed_jobs(&state, &JobSearch::default()).await?;

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    xml.push_str(&format!("  <url><loc>{}/</loc></url>\n", escape_xml(base)));
    for view in &jobs {
        let lastmod = view
            .job
            .published_at
            .map(|at| format!("<lastmod>{}</lastmod>", at.format("%Y-%m-%d")))
            .unwrap_or_default();
        xml.push_str(&format!(
            "  <url><loc>{}/jobs/{}</loc>{}</url>\n",
            escape_xml(base),
            view.job.id,
            lastmod
        ));
    }
    xml.push_str("</urlset>\n");

    Ok(([(header::CONTENT_TYPE, "application/xml")], xml))
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
