//! Job workflows
//!
//! Combines the lifecycle policy with persistence and the payment provider.
//! Every status change goes through [`JobRepository::apply_transition`], so
//! two requests racing on the same job cannot both succeed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::gate::ensure_owner;
use crate::lifecycle::{JobDraft, LifecyclePolicy, PublishTrigger, Transition};
use crate::models::{Job, JobChanges, JobStatus};
use crate::payment::{PaymentProvider, PaymentSession};
use crate::repositories::{CategoryRepository, EmployerRepository, JobRepository, Repositories};

#[derive(Clone)]
pub struct JobService {
    policy: LifecyclePolicy,
    jobs: Arc<dyn JobRepository>,
    employers: Arc<dyn EmployerRepository>,
    categories: Arc<dyn CategoryRepository>,
    payments: Arc<dyn PaymentProvider>,
}

impl JobService {
    pub fn new(
        policy: LifecyclePolicy,
        repositories: &Repositories,
        payments: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            policy,
            jobs: repositories.jobs.clone(),
            employers: repositories.employers.clone(),
            categories: repositories.categories.clone(),
            payments,
        }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Load a job or fail with `NotFound`
    pub async fn get(&self, id: Uuid) -> ApiResult<Job> {
        self.jobs.find_by_id(id).await?.ok_or(ApiError::NotFound)
    }

    /// Load a job owned by `account_id`; other accounts see `NotFound`
    pub async fn get_owned(&self, id: Uuid, account_id: Uuid) -> ApiResult<Job> {
        let job = self.get(id).await?;
        ensure_owner(&job, account_id)?;
        Ok(job)
    }

    /// Validate and insert a new job.
    ///
    /// Field validation runs first, so an invalid draft never touches storage.
    pub async fn create(
        &self,
        draft: JobDraft,
        status: JobStatus,
        now: DateTime<Utc>,
    ) -> ApiResult<Job> {
        let account_id = draft.employer_account_id;
        let new_job = self.policy.new_job(draft, status, now)?;

        if let Some(account_id) = account_id {
            let existing = self.jobs.count_for_account(account_id).await?;
            self.policy.check_quota(existing)?;
        }

        let employer = self
            .employers
            .find_by_id(new_job.employer_id)
            .await?
            .ok_or_else(|| ApiError::validation("employer_id", "does not exist"))?;
        if account_id.is_some() && employer.account_id != account_id {
            return Err(ApiError::validation(
                "employer_id",
                "does not belong to this account",
            ));
        }

        if let Some(category_id) = new_job.category_id {
            if self.categories.find_by_id(category_id).await?.is_none() {
                return Err(ApiError::validation("category_id", "does not exist"));
            }
        }

        let job = self.jobs.create(&new_job).await?;
        info!("Created {} job {}", job.status, job.id);
        Ok(job)
    }

    /// Apply field edits that do not touch the lifecycle
    pub async fn edit(&self, job: &Job, changes: &JobChanges) -> ApiResult<Job> {
        if changes.is_empty() {
            return Ok(job.clone());
        }

        self.policy.validate_changes(job, changes)?;

        if let Some(category_id) = changes.category_id {
            if self.categories.find_by_id(category_id).await?.is_none() {
                return Err(ApiError::validation("category_id", "does not exist"));
            }
        }
        if let Some(employer_id) = changes.employer_id {
            if self.employers.find_by_id(employer_id).await?.is_none() {
                return Err(ApiError::validation("employer_id", "does not exist"));
            }
        }

        self.jobs
            .update_details(job.id, changes)
            .await?
            .ok_or(ApiError::NotFound)
    }

    /// Admin edit of fields and, optionally, the status.
    ///
    /// The status change is planned against the edited job before anything
    /// is written, so a rejected transition leaves the job untouched.
    pub async fn update(
        &self,
        job: &Job,
        changes: &JobChanges,
        target: Option<JobStatus>,
        now: DateTime<Utc>,
    ) -> ApiResult<Job> {
        let transition = match target {
            Some(target) => {
                let mut edited = job.clone();
                changes.apply_to(&mut edited);
                self.plan_status(&edited, target, now)?
            }
            None => None,
        };

        let job = self.edit(job, changes).await?;
        match transition {
            Some(transition) => self.apply(job.id, &transition).await,
            None => Ok(job),
        }
    }

    fn plan_status(
        &self,
        job: &Job,
        target: JobStatus,
        now: DateTime<Utc>,
    ) -> ApiResult<Option<Transition>> {
        self.policy
            .plan_admin_status(job, target, now)
            .map_err(|e| {
                warn!("Rejected status change of job {}: {}", job.id, e);
                e.into()
            })
    }

    /// Handle a payment confirmation for `job_id`.
    ///
    /// Retries against an already published job are no-ops. Confirmations
    /// for unknown, expired or refunded jobs are logged and ignored.
    pub async fn confirm_payment(&self, job_id: Uuid, now: DateTime<Utc>) -> ApiResult<Option<Job>> {
        let Some(job) = self.jobs.find_by_id(job_id).await? else {
            warn!("Payment confirmed for unknown job {}", job_id);
            return Ok(None);
        };

        match job.status {
            JobStatus::Draft => {}
            JobStatus::Published => {
                info!("Job {} is already published", job_id);
                return Ok(Some(job));
            }
            JobStatus::Expired | JobStatus::Refunded => {
                warn!("Ignoring payment for {} job {}", job.status, job_id);
                return Ok(None);
            }
        }

        let transition = self
            .policy
            .plan_publish(&job, PublishTrigger::Payment, now)?;
        match self.jobs.apply_transition(job_id, &transition).await? {
            Some(published) => {
                info!("Published job {} after payment", job_id);
                Ok(Some(published))
            }
            // A concurrent confirmation got there first
            None => Ok(self.jobs.find_by_id(job_id).await?),
        }
    }

    /// Employer refund request, allowed once and only inside the refund window
    pub async fn request_refund(
        &self,
        job_id: Uuid,
        account_id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ApiResult<Job> {
        let job = self.get_owned(job_id, account_id).await?;

        let transition = self.policy.plan_refund(&job, reason, now).map_err(|e| {
            warn!("Rejected refund of job {}: {}", job_id, e);
            ApiError::from(e)
        })?;

        let refunded = self.apply(job_id, &transition).await?;
        info!("Refunded job {}", job_id);
        Ok(refunded)
    }

    /// Start checkout for a draft job and remember the provider reference
    pub async fn start_checkout(&self, job: &Job, amount: i64) -> ApiResult<PaymentSession> {
        if job.status != JobStatus::Draft {
            return Err(ApiError::IneligibleTransition {
                from: job.status,
                to: JobStatus::Published,
            });
        }

        let session = self.payments.initiate(job.id, amount).await?;

        self.jobs
            .record_payment(job.id, &session.reference, amount)
            .await?
            .ok_or(ApiError::IneligibleTransition {
                from: JobStatus::Published,
                to: JobStatus::Published,
            })?;

        Ok(session)
    }

    async fn apply(&self, job_id: Uuid, transition: &Transition) -> ApiResult<Job> {
        match self.jobs.apply_transition(job_id, transition).await? {
            Some(job) => Ok(job),
            None => {
                warn!(
                    "Job {} changed before it could move to {}",
                    job_id, transition.to
                );
                Err(ApiError::IneligibleTransition {
                    from: transition.from,
                    to: transition.to,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewEmployer;
    use crate::payment::PaymentError;
    use async_trait::async_trait;
    use chrono::Duration;

    struct FixedCheckout;

    #[async_trait]
    impl PaymentProvider for FixedCheckout {
        async fn initiate(&self, job_id: Uuid, _amount: i64) -> Result<PaymentSession, PaymentError> {
            Ok(PaymentSession {
                reference: format!("cs_{}", job_id.simple()),
                checkout_url: "https://pay.example.com/session".to_string(),
            })
        }
    }

    struct FailingCheckout;

    #[async_trait]
    impl PaymentProvider for FailingCheckout {
        async fn initiate(&self, _job_id: Uuid, _amount: i64) -> Result<PaymentSession, PaymentError> {
            Err(PaymentError::InvalidResponse("down".to_string()))
        }
    }

    async fn service(payments: Arc<dyn PaymentProvider>) -> (JobService, Uuid, Uuid) {
        let repositories = Repositories::memory();
        let account_id = Uuid::new_v4();
        let employer = repositories
            .employers
            .create(&NewEmployer {
                name: "Acme".to_string(),
                website: None,
                description: None,
                account_id: Some(account_id),
            })
            .await
            .unwrap();
        let policy = LifecyclePolicy::new(30, 4, true, Some(2));

        (
            JobService::new(policy, &repositories, payments),
            employer.id,
            account_id,
        )
    }

    fn draft(employer_id: Uuid, account_id: Uuid) -> JobDraft {
        JobDraft {
            title: "QA Engineer".to_string(),
            description: "Own the release test plan".to_string(),
            tags: None,
            salary_min: Some(40_000),
            salary_max: Some(45_000),
            salary_currency: "USD".to_string(),
            apply_url: "https://acme.test/careers".to_string(),
            employer_id: Some(employer_id),
            employer_account_id: Some(account_id),
            category_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_checks_employer_and_quota() {
        let (service, employer_id, account_id) = service(Arc::new(FixedCheckout)).await;
        let now = Utc::now();

        let unknown = JobDraft {
            employer_id: Some(Uuid::new_v4()),
            ..draft(employer_id, account_id)
        };
        assert!(matches!(
            service.create(unknown, JobStatus::Draft, now).await,
            Err(ApiError::Validation { field: "employer_id", .. })
        ));

        let foreign = draft(employer_id, Uuid::new_v4());
        assert!(matches!(
            service.create(foreign, JobStatus::Draft, now).await,
            Err(ApiError::Validation { field: "employer_id", .. })
        ));

        for _ in 0..2 {
            service
                .create(draft(employer_id, account_id), JobStatus::Draft, now)
                .await
                .unwrap();
        }
        assert!(matches!(
            service
                .create(draft(employer_id, account_id), JobStatus::Draft, now)
                .await,
            Err(ApiError::Validation { field: "max_jobs", .. })
        ));
    }

    #[tokio::test]
    async fn test_confirm_payment_is_idempotent() {
        let (service, employer_id, account_id) = service(Arc::new(FixedCheckout)).await;
        let now = Utc::now();
        let job = service
            .create(draft(employer_id, account_id), JobStatus::Draft, now)
            .await
            .unwrap();

        let first = service.confirm_payment(job.id, now).await.unwrap().unwrap();
        assert_eq!(first.status, JobStatus::Published);
        assert!(first.payment_completed);
        assert_eq!(first.expires_at, Some(now + Duration::days(30)));

        let later = now + Duration::minutes(5);
        let second = service.confirm_payment(job.id, later).await.unwrap().unwrap();
        assert_eq!(second.published_at, first.published_at);

        assert!(service
            .confirm_payment(Uuid::new_v4(), now)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_refund_requires_owner_and_window() {
        let (service, employer_id, account_id) = service(Arc::new(FixedCheckout)).await;
        let now = Utc::now();
        let job = service
            .create(draft(employer_id, account_id), JobStatus::Published, now)
            .await
            .unwrap();

        assert!(matches!(
            service
                .request_refund(job.id, Uuid::new_v4(), None, now)
                .await,
            Err(ApiError::NotFound)
        ));

        let too_late = now + Duration::hours(5);
        assert!(matches!(
            service
                .request_refund(job.id, account_id, None, too_late)
                .await,
            Err(ApiError::IneligibleTransition { .. })
        ));
        assert_eq!(service.get(job.id).await.unwrap().status, JobStatus::Published);

        let refunded = service
            .request_refund(job.id, account_id, Some("Hired".to_string()), now)
            .await
            .unwrap();
        assert_eq!(refunded.status, JobStatus::Refunded);
        assert_eq!(refunded.refund_reason.as_deref(), Some("Hired"));
    }

    #[tokio::test]
    async fn test_failed_checkout_leaves_draft() {
        let (service, employer_id, account_id) = service(Arc::new(FailingCheckout)).await;
        let job = service
            .create(draft(employer_id, account_id), JobStatus::Draft, Utc::now())
            .await
            .unwrap();

        assert!(matches!(
            service.start_checkout(&job, 1000).await,
            Err(ApiError::PaymentProvider(_))
        ));

        let reloaded = service.get(job.id).await.unwrap();
        assert_eq!(reloaded.status, JobStatus::Draft);
        assert_eq!(reloaded.stripe_payment_intent_id, None);
    }

    #[tokio::test]
    async fn test_checkout_records_reference() {
        let (service, employer_id, account_id) = service(Arc::new(FixedCheckout)).await;
        let job = service
            .create(draft(employer_id, account_id), JobStatus::Draft, Utc::now())
            .await
            .unwrap();

        let session = service.start_checkout(&job, 1000).await.unwrap();

        let reloaded = service.get(job.id).await.unwrap();
        assert_eq!(reloaded.stripe_payment_intent_id, Some(session.reference));
        assert_eq!(reloaded.payment_amount, Some(1000));
        assert_eq!(reloaded.status, JobStatus::Draft);
    }

    #[tokio::test]
    async fn test_rejected_status_change_writes_nothing() {
        let (service, employer_id, account_id) = service(Arc::new(FixedCheckout)).await;
        let now = Utc::now();
        let job = service
            .create(draft(employer_id, account_id), JobStatus::Published, now)
            .await
            .unwrap();

        let changes = JobChanges {
            title: Some("Renamed while reverting".to_string()),
            ..JobChanges::default()
        };
        assert!(matches!(
            service
                .update(&job, &changes, Some(JobStatus::Draft), now)
                .await,
            Err(ApiError::IneligibleTransition {
                from: JobStatus::Published,
                to: JobStatus::Draft
            })
        ));
        assert_eq!(service.get(job.id).await.unwrap().title, "QA Engineer");

        let expired = service
            .update(&job, &changes, Some(JobStatus::Expired), now)
            .await
            .unwrap();
        assert_eq!(expired.status, JobStatus::Expired);
        assert_eq!(expired.title, "Renamed while reverting");
    }

    #[tokio::test]
    async fn test_publish_keeps_expiry_set_in_same_edit() {
        let (service, employer_id, account_id) = service(Arc::new(FixedCheckout)).await;
        let now = Utc::now();
        let job = service
            .create(draft(employer_id, account_id), JobStatus::Draft, now)
            .await
            .unwrap();
        let expires_at = now + Duration::days(7);

        let changes = JobChanges {
            expires_at: Some(expires_at),
            ..JobChanges::default()
        };
        let published = service
            .update(&job, &changes, Some(JobStatus::Published), now)
            .await
            .unwrap();
        assert_eq!(published.status, JobStatus::Published);
        assert_eq!(published.expires_at, Some(expires_at));
    }

    #[tokio::test]
    async fn test_stale_refund_plan_is_ineligible() {
        let (service, employer_id, account_id) = service(Arc::new(FixedCheckout)).await;
        let now = Utc::now();
        let job = service
            .create(draft(employer_id, account_id), JobStatus::Published, now)
            .await
            .unwrap();

        // Two requests that both read the job before either wrote
        let first = service.policy.plan_refund(&job, None, now).unwrap();
        let second = service.policy.plan_refund(&job, None, now).unwrap();

        assert!(service.apply(job.id, &first).await.is_ok());
        assert!(matches!(
            service.apply(job.id, &second).await,
            Err(ApiError::IneligibleTransition {
                from: JobStatus::Published,
                to: JobStatus::Refunded
            })
        ));
    }
}
