//! Submitted form bodies
//!
//! Every field is optional text so a body always decodes and the CSRF check
//! runs before any field is looked at. Typed parsing happens afterwards.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::lifecycle::JobDraft;
use crate::models::job::assume_utc;
use crate::models::{JobChanges, JobStatus};

/// Forms carrying a CSRF token field
pub trait CsrfForm {
    fn csrf_token(&self) -> Option<&str>;
}

macro_rules! csrf_form {
    ($($form:ty),* $(,)?) => {
        $(
            impl CsrfForm for $form {
                fn csrf_token(&self) -> Option<&str> {
                    self.csrf_token.as_deref()
                }
            }
        )*
    };
}

csrf_form!(
    TokenForm,
    AdminLoginForm,
    EmployerLoginForm,
    RegisterForm,
    JobForm,
    RefundForm,
    EmployerForm,
    CategoryForm,
);

/// Body of a form with no fields besides the token
#[derive(Debug, Default, Deserialize)]
pub struct TokenForm {
    pub csrf_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminLoginForm {
    pub csrf_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmployerLoginForm {
    pub csrf_token: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    pub csrf_token: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobForm {
    pub csrf_token: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub salary_min: Option<String>,
    pub salary_max: Option<String>,
    pub salary_currency: Option<String>,
    pub apply_url: Option<String>,
    pub employer_id: Option<String>,
    pub category_id: Option<String>,
    pub status: Option<String>,
    /// HTML `datetime-local` value
    pub expires_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundForm {
    pub csrf_token: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmployerForm {
    pub csrf_token: Option<String>,
    pub name: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryForm {
    pub csrf_token: Option<String>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

/// Trimmed value, `None` when blank
pub fn text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn integer(field: &'static str, value: &Option<String>) -> ApiResult<Option<i64>> {
    text(value)
        .map(|value| {
            value
                .parse::<i64>()
                .map_err(|_| ApiError::validation(field, "must be a whole number"))
        })
        .transpose()
}

fn uuid(field: &'static str, value: &Option<String>) -> ApiResult<Option<Uuid>> {
    text(value)
        .map(|value| {
            value
                .parse::<Uuid>()
                .map_err(|_| ApiError::validation(field, "is not a valid identifier"))
        })
        .transpose()
}

/// Parse an HTML `datetime-local` value as UTC
fn datetime_local(field: &'static str, value: &Option<String>) -> ApiResult<Option<DateTime<Utc>>> {
    text(value)
        .map(|value| {
            NaiveDateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M")
                .or_else(|_| NaiveDateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M:%S"))
                .map(assume_utc)
                .map_err(|_| ApiError::validation(field, "must be a date and time"))
        })
        .transpose()
}

impl JobForm {
    /// Fields for a new job; presence and range checks are left to the lifecycle policy
    pub fn to_draft(
        &self,
        default_currency: &str,
        employer_account_id: Option<Uuid>,
    ) -> ApiResult<JobDraft> {
        Ok(JobDraft {
            title: text(&self.title).unwrap_or_default(),
            description: text(&self.description).unwrap_or_default(),
            tags: text(&self.tags),
            salary_min: integer("salary_min", &self.salary_min)?,
            salary_max: integer("salary_max", &self.salary_max)?,
            salary_currency: text(&self.salary_currency)
                .unwrap_or_else(|| default_currency.to_string()),
            apply_url: text(&self.apply_url).unwrap_or_default(),
            employer_id: uuid("employer_id", &self.employer_id)?,
            employer_account_id,
            category_id: uuid("category_id", &self.category_id)?,
        })
    }

    /// Edits to an existing job; blank fields are left unchanged
    pub fn to_changes(&self) -> ApiResult<JobChanges> {
        Ok(JobChanges {
            title: text(&self.title),
            description: text(&self.description),
            tags: text(&self.tags),
            salary_min: integer("salary_min", &self.salary_min)?,
            salary_max: integer("salary_max", &self.salary_max)?,
            apply_url: text(&self.apply_url),
            employer_id: uuid("employer_id", &self.employer_id)?,
            category_id: uuid("category_id", &self.category_id)?,
            expires_at: datetime_local("expires_at", &self.expires_at)?,
        })
    }

    /// Status picked on the admin form: `draft`, `published` or `expired`
    pub fn status(&self) -> ApiResult<Option<JobStatus>> {
        match text(&self.status).as_deref() {
            None => Ok(None),
            Some("draft") => Ok(Some(JobStatus::Draft)),
            Some("published") => Ok(Some(JobStatus::Published)),
            Some("expired") => Ok(Some(JobStatus::Expired)),
            Some(_) => Err(ApiError::validation(
                "status",
                "must be draft, published or expired",
            )),
        }
    }
}
