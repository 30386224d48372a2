//! Job posting model

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a job posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Draft,
    Published,
    Expired,
    Refunded,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Draft => "draft",
            JobStatus::Published => "published",
            JobStatus::Expired => "expired",
            JobStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(JobStatus::Draft),
            "published" => Ok(JobStatus::Published),
            "expired" => Ok(JobStatus::Expired),
            "refunded" => Ok(JobStatus::Refunded),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Job entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Comma-separated tags
    pub tags: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub salary_currency: String,
    pub apply_url: String,
    pub employer_id: Uuid,
    pub employer_account_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub payment_completed: bool,
    pub payment_amount: Option<i64>,
    pub stripe_payment_intent_id: Option<String>,
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
}

impl Job {
    /// Tags split on commas, trimmed, empties dropped
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True iff `expires_at` is set and lies before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < now)
    }

    /// True iff the job is published, `published_at` is set, and `now` is
    /// still within `window` of publication
    pub fn can_refund_at(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Published
            && self
                .published_at
                .is_some_and(|published_at| now <= published_at + window)
    }

    /// Whether the job belongs in public listings at `now`
    pub fn is_listed_at(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Published && self.expires_at.is_none_or(|at| at > now)
    }

    /// Whether the job has an owning employer account equal to `account_id`
    pub fn is_owned_by(&self, account_id: Uuid) -> bool {
        self.employer_account_id == Some(account_id)
    }
}

/// Interpret a timestamp without zone information as UTC
pub fn assume_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&naive)
}

/// New job creation payload
#[derive(Debug, Clone)]
pub struct NewJob {
    pub title: String,
    pub description: String,
    pub tags: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub salary_currency: String,
    pub apply_url: String,
    pub employer_id: Uuid,
    pub employer_account_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub status: JobStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Field edits that do not touch the lifecycle
#[derive(Debug, Clone, Default)]
pub struct JobChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub apply_url: Option<String>,
    pub employer_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl JobChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.salary_min.is_none()
            && self.salary_max.is_none()
            && self.apply_url.is_none()
            && self.employer_id.is_none()
            && self.category_id.is_none()
            && self.expires_at.is_none()
    }

    /// Apply the edits to an in-memory job
    pub fn apply_to(&self, job: &mut Job) {
        if let Some(title) = &self.title {
            job.title = title.clone();
        }
        if let Some(description) = &self.description {
            job.description = description.clone();
        }
        if let Some(tags) = &self.tags {
            job.tags = Some(tags.clone());
        }
        if let Some(salary_min) = self.salary_min {
            job.salary_min = Some(salary_min);
        }
        if let Some(salary_max) = self.salary_max {
            job.salary_max = Some(salary_max);
        }
        if let Some(apply_url) = &self.apply_url {
            job.apply_url = apply_url.clone();
        }
        if let Some(employer_id) = self.employer_id {
            job.employer_id = employer_id;
        }
        if let Some(category_id) = self.category_id {
            job.category_id = Some(category_id);
        }
        if let Some(expires_at) = self.expires_at {
            job.expires_at = Some(expires_at);
        }
    }
}

/// Public search filters
#[derive(Debug, Clone, Default)]
pub struct JobSearch {
    /// Substring matched against title and tags
    pub q: Option<String>,
    /// Category the job must belong to
    pub category_id: Option<Uuid>,
    /// Tags that must all appear
    pub tags: Vec<String>,
}

impl JobSearch {
    /// Whether `job` passes the text, category and tag filters
    pub fn matches(&self, job: &Job) -> bool {
        let contains = |haystack: &str, needle: &str| {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        };
        let tags = job.tags.as_deref().unwrap_or("");

        let text_ok = self
            .q
            .as_deref()
            .is_none_or(|q| contains(&job.title, q) || contains(tags, q));
        let category_ok = self
            .category_id
            .is_none_or(|category_id| job.category_id == Some(category_id));
        let tags_ok = self.tags.iter().all(|tag| contains(tags, tag));

        text_ok && category_ok && tags_ok
    }
}

/// Job as shown to clients, with derived predicates
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub tag_list: Vec<String>,
    pub is_expired: bool,
    pub can_refund: bool,
}
