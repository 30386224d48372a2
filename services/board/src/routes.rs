//! HTTP routes
//!
//! Pages render as JSON. Form pages include a `csrf_token` in their body and
//! every response carries a fresh token in the `x-csrf-token` header.

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::gate::{issue_csrf_token, require_admin, require_employer};
use crate::state::AppState;

pub mod admin;
pub mod employer;
pub mod payment;
pub mod public;

/// Create the router for the board service
pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin", get(admin::dashboard))
        .route("/admin/jobs/new", get(admin::new_job_form).post(admin::create_job))
        .route("/admin/jobs/:id", get(admin::show_job).patch(admin::update_job))
        .route("/admin/employers", post(admin::create_employer))
        .route("/admin/categories", post(admin::create_category))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let employer_routes = Router::new()
        .route("/employer/dashboard", get(employer::dashboard))
        .route(
            "/employer/jobs/new",
            get(employer::new_job_form).post(employer::create_job),
        )
        .route(
            "/employer/jobs/:id",
            get(employer::show_job).patch(employer::update_job),
        )
        .route("/employer/jobs/:id/payment", get(employer::payment_page))
        .route("/employer/jobs/:id/checkout", post(employer::checkout))
        .route("/employer/jobs/:id/refund", post(employer::refund))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_employer,
        ));

    Router::new()
        .route("/", get(public::index))
        .route("/search", get(public::search))
        .route("/jobs/feed.json", get(public::feed))
        .route("/jobs/:id", get(public::job_detail))
        .route("/sitemap.xml", get(public::sitemap))
        .route("/health", get(public::health_check))
        .route("/admin/login", get(admin::login_form).post(admin::login))
        .route("/admin/logout", post(admin::logout))
        .route(
            "/employer/register",
            get(employer::register_form).post(employer::register),
        )
        .route(
            "/employer/login",
            get(employer::login_form).post(employer::login),
        )
        .route("/employer/logout", post(employer::logout))
        .route("/stripe/webhook", post(payment::webhook))
        .merge(admin_routes)
        .merge(employer_routes)
        .layer(middleware::from_fn_with_state(state.clone(), issue_csrf_token))
        .with_state(state)
}
