//! Persistence for accounts, employers, categories and jobs
//!
//! Each collection is a trait so handlers can run against PostgreSQL in
//! production and against [`memory::MemoryStore`] in tests or throwaway
//! deployments.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::lifecycle::Transition;
use crate::models::{
    Category, Employer, EmployerAccount, Job, JobChanges, JobSearch, NewCategory, NewEmployer,
    NewEmployerAccount, NewJob,
};

pub mod memory;
pub mod postgres;

use memory::MemoryStore;
use postgres::PgRepositories;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert an account; a taken email is [`DatabaseError::Duplicate`](common::error::DatabaseError::Duplicate)
    async fn create(&self, account: &NewEmployerAccount) -> DatabaseResult<EmployerAccount>;

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<EmployerAccount>>;

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<EmployerAccount>>;

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> DatabaseResult<()>;
}

#[async_trait]
pub trait EmployerRepository: Send + Sync {
    async fn create(&self, employer: &NewEmployer) -> DatabaseResult<Employer>;

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Employer>>;

    async fn list_all(&self) -> DatabaseResult<Vec<Employer>>;

    async fn list_for_account(&self, account_id: Uuid) -> DatabaseResult<Vec<Employer>>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Insert a category; name and slug are unique
    async fn create(&self, category: &NewCategory) -> DatabaseResult<Category>;

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Category>>;

    async fn find_by_slug(&self, slug: &str) -> DatabaseResult<Option<Category>>;

    async fn list_all(&self) -> DatabaseResult<Vec<Category>>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &NewJob) -> DatabaseResult<Job>;

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Job>>;

    /// Every job, newest first
    async fn list_all(&self) -> DatabaseResult<Vec<Job>>;

    async fn list_for_account(&self, account_id: Uuid) -> DatabaseResult<Vec<Job>>;

    async fn count_for_account(&self, account_id: Uuid) -> DatabaseResult<i64>;

    /// Published, unexpired jobs matching `search`, newest publication first
    async fn list_public(&self, search: &JobSearch, now: DateTime<Utc>)
    -> DatabaseResult<Vec<Job>>;

    /// Apply field edits; `None` when the job does not exist
    async fn update_details(&self, id: Uuid, changes: &JobChanges)
    -> DatabaseResult<Option<Job>>;

    /// Apply `transition` atomically if its guard still holds.
    ///
    /// Returns the updated job, or `None` when the job is missing or another
    /// request changed it first.
    async fn apply_transition(&self, id: Uuid, transition: &Transition)
    -> DatabaseResult<Option<Job>>;

    /// Store the checkout reference and amount on a draft job
    async fn record_payment(
        &self,
        id: Uuid,
        reference: &str,
        amount: i64,
    ) -> DatabaseResult<Option<Job>>;
}

/// The four collections behind one handle
#[derive(Clone)]
pub struct Repositories {
    pub accounts: Arc<dyn AccountRepository>,
    pub employers: Arc<dyn EmployerRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub jobs: Arc<dyn JobRepository>,
}

impl Repositories {
    /// Process-local tables
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            accounts: store.clone(),
            employers: store.clone(),
            categories: store.clone(),
            jobs: store,
        }
    }

    /// PostgreSQL tables from `schema.sql`
    pub fn postgres(pool: PgPool) -> Self {
        let repositories = Arc::new(PgRepositories::new(pool));
        Self {
            accounts: repositories.clone(),
            employers: repositories.clone(),
            categories: repositories.clone(),
            jobs: repositories,
        }
    }
}
