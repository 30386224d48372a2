//! Per-route access control
//!
//! Protected routers are wrapped in [`require_admin`] or [`require_employer`].
//! A missing session redirects to the matching login page instead of
//! failing. Mutating handlers call [`verify_csrf`] before reading any other
//! field.

use auth::csrf::{CSRF_HEADER, extract_token};
use auth::{CsrfGuard, Principal, SessionManager};
use axum::{
    Form,
    extract::{Request, State, rejection::FormRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::forms::CsrfForm;
use crate::models::Job;
use crate::state::AppState;

pub const ADMIN_LOGIN: &str = "/admin/login";
pub const ADMIN_DASHBOARD: &str = "/admin";
pub const EMPLOYER_LOGIN: &str = "/employer/login";
pub const EMPLOYER_DASHBOARD: &str = "/employer/dashboard";

/// Principal kind a route needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Public,
    Admin,
    Employer,
}

impl Requirement {
    /// Resolve the principal this requirement looks at.
    ///
    /// Protected routes only decode their own cookie; public routes prefer
    /// an admin session over an employer one.
    pub fn principal(self, sessions: &SessionManager, jar: &CookieJar) -> Principal {
        match self {
            Requirement::Public => sessions.resolve(jar),
            Requirement::Admin if sessions.verify_admin(jar) => Principal::Admin,
            Requirement::Employer => sessions
                .verify_employer(jar)
                .map_or(Principal::Anonymous, Principal::EmployerAccount),
            Requirement::Admin => Principal::Anonymous,
        }
    }

    pub fn is_satisfied_by(self, principal: Principal) -> bool {
        match self {
            Requirement::Public => true,
            Requirement::Admin => principal == Principal::Admin,
            Requirement::Employer => matches!(principal, Principal::EmployerAccount(_)),
        }
    }

    pub fn login_page(self) -> Option<&'static str> {
        match self {
            Requirement::Public => None,
            Requirement::Admin => Some(ADMIN_LOGIN),
            Requirement::Employer => Some(EMPLOYER_LOGIN),
        }
    }

    pub fn dashboard(self) -> Option<&'static str> {
        match self {
            Requirement::Public => None,
            Requirement::Admin => Some(ADMIN_DASHBOARD),
            Requirement::Employer => Some(EMPLOYER_DASHBOARD),
        }
    }

    /// `NotAuthenticated` pointing at the login page unless `principal` qualifies
    pub fn authorize(self, principal: Principal) -> ApiResult<()> {
        match self.login_page() {
            Some(login) if !self.is_satisfied_by(principal) => {
                Err(ApiError::NotAuthenticated { login })
            }
            _ => Ok(()),
        }
    }
}

/// Account id of the signed-in employer, set by [`require_employer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmployerAccountId(pub Uuid);

/// Middleware for admin-only routes
pub async fn require_admin(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = Requirement::Admin.principal(&state.sessions, &jar);
    if let Err(e) = Requirement::Admin.authorize(principal) {
        debug!("No admin session for {}", req.uri().path());
        return Err(e);
    }

    Ok(next.run(req).await)
}

/// Middleware for employer-only routes
pub async fn require_employer(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match Requirement::Employer.principal(&state.sessions, &jar) {
        Principal::EmployerAccount(account_id) => {
            req.extensions_mut().insert(EmployerAccountId(account_id));
            Ok(next.run(req).await)
        }
        _ => {
            debug!("No employer session for {}", req.uri().path());
            Err(ApiError::NotAuthenticated {
                login: EMPLOYER_LOGIN,
            })
        }
    }
}

/// Redirect to the dashboard when the visitor already holds the role a
/// login or registration form would grant
pub fn already_signed_in(
    requirement: Requirement,
    sessions: &SessionManager,
    jar: &CookieJar,
) -> Option<Response> {
    let principal = requirement.principal(sessions, jar);
    match requirement.dashboard() {
        Some(dashboard) if requirement.is_satisfied_by(principal) => Some(redirect_to(dashboard)),
        _ => None,
    }
}

/// Employer-scoped access to a job. Non-owners get `NotFound`.
pub fn ensure_owner(job: &Job, account_id: Uuid) -> ApiResult<()> {
    if job.is_owned_by(account_id) {
        Ok(())
    } else {
        debug!("Account {} does not own job {}", account_id, job.id);
        Err(ApiError::NotFound)
    }
}

/// Check the CSRF token of a mutating request: form field first, then header
pub fn verify_csrf(guard: &CsrfGuard, form_value: Option<&str>, headers: &HeaderMap) -> ApiResult<()> {
    let Some(token) = extract_token(form_value, headers) else {
        warn!("Rejected request without CSRF token");
        return Err(ApiError::MissingCsrfToken);
    };

    if guard.verify(Some(&token)) {
        Ok(())
    } else {
        warn!("Rejected request with invalid CSRF token");
        Err(ApiError::InvalidCsrfToken)
    }
}

/// Check the CSRF token of a mutating request, then hand back its form.
///
/// The token is checked before the body is judged: a request carrying a
/// valid `x-csrf-token` header and an empty or non-form body passes with
/// every field empty, and a request without any token is rejected whatever
/// its content type.
pub fn verified_form<T: CsrfForm + Default>(
    guard: &CsrfGuard,
    headers: &HeaderMap,
    submitted: Result<Form<T>, FormRejection>,
) -> ApiResult<T> {
    match submitted {
        Ok(Form(form)) => {
            verify_csrf(guard, form.csrf_token(), headers)?;
            Ok(form)
        }
        Err(rejection) => {
            verify_csrf(guard, None, headers)?;
            match rejection {
                FormRejection::InvalidFormContentType(_) => {
                    debug!("Body is not a form, reading no fields");
                    Ok(T::default())
                }
                other => {
                    warn!("Unreadable form body: {}", other);
                    Err(ApiError::BadRequest(other.body_text()))
                }
            }
        }
    }
}

/// Fresh CSRF token for a response body
pub fn csrf_token(guard: &CsrfGuard) -> ApiResult<String> {
    guard.generate().map_err(|e| {
        error!("Failed to mint CSRF token: {}", e);
        ApiError::InternalServerError
    })
}

/// Middleware attaching a fresh CSRF token header to every response
pub async fn issue_csrf_token(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;

    match state
        .csrf
        .generate()
        .map(|token| HeaderValue::from_str(&token))
    {
        Ok(Ok(value)) => {
            response.headers_mut().insert(CSRF_HEADER, value);
        }
        Ok(Err(e)) => error!("CSRF token is not a valid header value: {}", e),
        Err(e) => error!("Failed to mint CSRF token: {}", e),
    }

    response
}

/// `302 Found` to `location`
pub fn redirect_to(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => ApiError::InternalServerError.into_response(),
    }
}
