//! Job lifecycle state machine
//!
//! ```text
//! draft ──► published ──► expired
//!                    └──► refunded
//! ```
//!
//! `expired` and `refunded` are terminal. The engine never writes anything
//! itself: every transition is planned as a [`Transition`] that carries the
//! guard it was planned under, and the persistence layer applies it as a
//! single conditional update. A guard miss at apply time means a concurrent
//! request moved the job first.
//!
//! Expiry by the passage of time is a read-time view ([`Job::is_expired_at`]);
//! only an explicit admin edit rewrites `status` to `expired`.

use chrono::{DateTime, Duration, Utc};
use common::BoardConfig;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Job, JobChanges, JobStatus, JobView, NewJob};

const TITLE_MAX_LEN: usize = 255;
const DESCRIPTION_MIN_LEN: usize = 10;
const TAGS_MAX_LEN: usize = 500;

/// Lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    /// The job's current state does not allow the requested move
    #[error("Job cannot move from {from} to {to}")]
    IneligibleTransition { from: JobStatus, to: JobStatus },

    /// A job field failed validation
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },
}

impl LifecycleError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

/// What caused a `draft -> published` move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishTrigger {
    /// Explicit admin status edit
    Admin,
    /// Payment-provider confirmation
    Payment,
}

/// Job fields submitted for creation, before validation
#[derive(Debug, Clone, Default)]
pub struct JobDraft {
    pub title: String,
    pub description: String,
    pub tags: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub salary_currency: String,
    pub apply_url: String,
    pub employer_id: Option<Uuid>,
    pub employer_account_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
}

/// A planned, guarded state change
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Status the job must still have when the change is applied
    pub from: JobStatus,
    pub to: JobStatus,
    /// Refund guard: `published_at` must not be earlier than this
    pub published_after: Option<DateTime<Utc>>,
    /// Assigned only when the job has no `published_at` yet
    pub published_at: Option<DateTime<Utc>>,
    /// Assigned only when the job has no `expires_at` yet
    pub expires_at: Option<DateTime<Utc>>,
    pub payment_completed: bool,
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
}

impl Transition {
    fn status_only(from: JobStatus, to: JobStatus) -> Self {
        Self {
            from,
            to,
            published_after: None,
            published_at: None,
            expires_at: None,
            payment_completed: false,
            refund_requested_at: None,
            refund_reason: None,
        }
    }

    /// Whether `job` still satisfies the guard this transition was planned under
    pub fn guard_holds(&self, job: &Job) -> bool {
        job.status == self.from
            && self.published_after.is_none_or(|earliest| {
                job.published_at
                    .is_some_and(|published_at| published_at >= earliest)
            })
    }

    /// Apply the field updates to an in-memory job
    pub fn apply_to(&self, job: &mut Job) {
        job.status = self.to;
        if job.published_at.is_none() {
            job.published_at = self.published_at;
        }
        if job.expires_at.is_none() {
            job.expires_at = self.expires_at;
        }
        if self.payment_completed {
            job.payment_completed = true;
        }
        if self.refund_requested_at.is_some() {
            job.refund_requested_at = self.refund_requested_at;
            job.refund_reason = self.refund_reason.clone();
        }
    }
}

/// Business rules for job creation and status changes
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    expiry: Duration,
    refund_window: Duration,
    salary_range_required: bool,
    max_jobs_per_employer: Option<u32>,
}

impl LifecyclePolicy {
    pub fn new(
        job_expiry_days: i64,
        refund_window_hours: i64,
        salary_range_required: bool,
        max_jobs_per_employer: Option<u32>,
    ) -> Self {
        Self {
            expiry: Duration::days(job_expiry_days),
            refund_window: Duration::hours(refund_window_hours),
            salary_range_required,
            max_jobs_per_employer,
        }
    }

    pub fn from_config(config: &BoardConfig) -> Self {
        Self::new(
            config.job_expiry_days,
            config.refund_window_hours,
            config.salary_range_required,
            config.max_jobs_per_employer,
        )
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    pub fn refund_window(&self) -> Duration {
        self.refund_window
    }

    /// Validate a draft and build the record to insert with `status`.
    ///
    /// A job created as published gets `published_at = now` and
    /// `expires_at = now + expiry`.
    pub fn new_job(
        &self,
        draft: JobDraft,
        status: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<NewJob, LifecycleError> {
        let employer_id = self.validate(&draft)?;

        let (published_at, expires_at) = match status {
            JobStatus::Draft => (None, None),
            JobStatus::Published => (Some(now), Some(now + self.expiry)),
            other => {
                return Err(LifecycleError::validation(
                    "status",
                    format!("a new job cannot be {}", other),
                ));
            }
        };

        Ok(NewJob {
            title: draft.title.trim().to_string(),
            description: draft.description,
            tags: draft.tags.filter(|tags| !tags.trim().is_empty()),
            salary_min: draft.salary_min,
            salary_max: draft.salary_max,
            salary_currency: draft.salary_currency.to_ascii_uppercase(),
            apply_url: draft.apply_url.trim().to_string(),
            employer_id,
            employer_account_id: draft.employer_account_id,
            category_id: draft.category_id,
            status,
            published_at,
            expires_at,
        })
    }

    /// Reject creation once an account holds its quota of jobs
    pub fn check_quota(&self, existing_jobs: i64) -> Result<(), LifecycleError> {
        match self.max_jobs_per_employer {
            Some(max) if existing_jobs >= i64::from(max) => Err(LifecycleError::validation(
                "max_jobs",
                format!("employers may post at most {} jobs", max),
            )),
            _ => Ok(()),
        }
    }

    fn validate(&self, draft: &JobDraft) -> Result<Uuid, LifecycleError> {
        validate_listing(
            &draft.title,
            &draft.description,
            draft.tags.as_deref(),
            &draft.apply_url,
        )?;
        validate_salary(draft.salary_min, draft.salary_max, self.salary_range_required)?;

        let currency = draft.salary_currency.as_str();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(LifecycleError::validation(
                "salary_currency",
                "must be a three-letter currency code",
            ));
        }

        draft
            .employer_id
            .ok_or_else(|| LifecycleError::validation("employer_id", "is required"))
    }

    /// Validate edits against the job they apply to.
    ///
    /// The salary range requirement only applies at creation.
    pub fn validate_changes(&self, job: &Job, changes: &JobChanges) -> Result<(), LifecycleError> {
        validate_listing(
            changes.title.as_deref().unwrap_or(&job.title),
            changes.description.as_deref().unwrap_or(&job.description),
            changes.tags.as_deref().or(job.tags.as_deref()),
            changes.apply_url.as_deref().unwrap_or(&job.apply_url),
        )?;
        validate_salary(
            changes.salary_min.or(job.salary_min),
            changes.salary_max.or(job.salary_max),
            false,
        )
    }

    /// Plan `draft -> published`
    pub fn plan_publish(
        &self,
        job: &Job,
        trigger: PublishTrigger,
        now: DateTime<Utc>,
    ) -> Result<Transition, LifecycleError> {
        if job.status != JobStatus::Draft {
            return Err(ineligible(job, JobStatus::Published));
        }

        let published_at = job.published_at.unwrap_or(now);
        let expires_at = job.expires_at.unwrap_or(published_at + self.expiry);

        Ok(Transition {
            published_at: Some(published_at),
            expires_at: Some(expires_at),
            payment_completed: trigger == PublishTrigger::Payment,
            ..Transition::status_only(JobStatus::Draft, JobStatus::Published)
        })
    }

    /// Plan `published -> expired`
    pub fn plan_expire(&self, job: &Job) -> Result<Transition, LifecycleError> {
        if job.status != JobStatus::Published {
            return Err(ineligible(job, JobStatus::Expired));
        }

        Ok(Transition::status_only(
            JobStatus::Published,
            JobStatus::Expired,
        ))
    }

    /// Plan `published -> refunded`, allowed only inside the refund window
    pub fn plan_refund(
        &self,
        job: &Job,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Transition, LifecycleError> {
        if !job.can_refund_at(self.refund_window, now) {
            debug!("Job {} is outside its refund window", job.id);
            return Err(ineligible(job, JobStatus::Refunded));
        }

        Ok(Transition {
            published_after: Some(now - self.refund_window),
            refund_requested_at: Some(now),
            refund_reason: reason.filter(|reason| !reason.trim().is_empty()),
            ..Transition::status_only(JobStatus::Published, JobStatus::Refunded)
        })
    }

    /// Plan an admin status edit. Re-submitting the current status plans nothing.
    pub fn plan_admin_status(
        &self,
        job: &Job,
        target: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Transition>, LifecycleError> {
        match (job.status, target) {
            (current, target) if current == target => Ok(None),
            (JobStatus::Draft, JobStatus::Published) => self
                .plan_publish(job, PublishTrigger::Admin, now)
                .map(Some),
            (JobStatus::Published, JobStatus::Expired) => self.plan_expire(job).map(Some),
            _ => Err(ineligible(job, target)),
        }
    }

    /// Attach the time-derived predicates for display
    pub fn view(&self, job: Job, now: DateTime<Utc>) -> JobView {
        JobView {
            tag_list: job.tag_list(),
            is_expired: job.is_expired_at(now),
            can_refund: job.can_refund_at(self.refund_window, now),
            job,
        }
    }
}

fn validate_listing(
    title: &str,
    description: &str,
    tags: Option<&str>,
    apply_url: &str,
) -> Result<(), LifecycleError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > TITLE_MAX_LEN {
        return Err(LifecycleError::validation(
            "title",
            format!("must be 1 to {} characters", TITLE_MAX_LEN),
        ));
    }

    if description.trim().chars().count() < DESCRIPTION_MIN_LEN {
        return Err(LifecycleError::validation(
            "description",
            format!("must be at least {} characters", DESCRIPTION_MIN_LEN),
        ));
    }

    if tags.is_some_and(|tags| tags.chars().count() > TAGS_MAX_LEN) {
        return Err(LifecycleError::validation(
            "tags",
            format!("must be at most {} characters", TAGS_MAX_LEN),
        ));
    }

    if !is_http_url(apply_url.trim()) {
        return Err(LifecycleError::validation(
            "apply_url",
            "must be an absolute http(s) URL",
        ));
    }

    Ok(())
}

fn validate_salary(
    min: Option<i64>,
    max: Option<i64>,
    range_required: bool,
) -> Result<(), LifecycleError> {
    if min.is_some_and(|min| min < 0) {
        return Err(LifecycleError::validation("salary_min", "must not be negative"));
    }
    if max.is_some_and(|max| max < 0) {
        return Err(LifecycleError::validation("salary_max", "must not be negative"));
    }

    match (min, max) {
        (Some(min), Some(max)) if max < min => Err(LifecycleError::validation(
            "salary_max",
            "must be greater than or equal to salary_min",
        )),
        (None, _) if range_required => Err(LifecycleError::validation("salary_min", "is required")),
        (_, None) if range_required => Err(LifecycleError::validation("salary_max", "is required")),
        _ => Ok(()),
    }
}

fn ineligible(job: &Job, to: JobStatus) -> LifecycleError {
    LifecycleError::IneligibleTransition {
        from: job.status,
        to,
    }
}

fn is_http_url(value: &str) -> bool {
    reqwest::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}
