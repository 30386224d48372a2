//! In-memory tables

use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AccountRepository, CategoryRepository, EmployerRepository, JobRepository};
use crate::lifecycle::Transition;
use crate::models::{
    Category, Employer, EmployerAccount, Job, JobChanges, JobSearch, JobStatus, NewCategory,
    NewEmployer, NewEmployerAccount, NewJob,
};

#[derive(Default)]
struct Tables {
    accounts: HashMap<Uuid, EmployerAccount>,
    employers: HashMap<Uuid, Employer>,
    categories: HashMap<Uuid, Category>,
    jobs: HashMap<Uuid, Job>,
}

/// Store keeping every collection behind one lock
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by_key(|job| Reverse(job.created_at));
    jobs
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn create(&self, account: &NewEmployerAccount) -> DatabaseResult<EmployerAccount> {
        let mut tables = self.tables.lock().await;

        if tables
            .accounts
            .values()
            .any(|existing| existing.email == account.email)
        {
            return Err(DatabaseError::Duplicate { field: "email" });
        }

        let created = EmployerAccount {
            id: Uuid::new_v4(),
            email: account.email.clone(),
            password_hash: account.password_hash.clone(),
            company_name: account.company_name.clone(),
            contact_name: account.contact_name.clone(),
            phone: account.phone.clone(),
            website: account.website.clone(),
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        };
        tables.accounts.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<EmployerAccount>> {
        Ok(self.tables.lock().await.accounts.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<EmployerAccount>> {
        Ok(self
            .tables
            .lock()
            .await
            .accounts
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> DatabaseResult<()> {
        if let Some(account) = self.tables.lock().await.accounts.get_mut(&id) {
            account.last_login = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl EmployerRepository for MemoryStore {
    async fn create(&self, employer: &NewEmployer) -> DatabaseResult<Employer> {
        let created = Employer {
            id: Uuid::new_v4(),
            name: employer.name.clone(),
            website: employer.website.clone(),
            description: employer.description.clone(),
            account_id: employer.account_id,
        };
        self.tables
            .lock()
            .await
            .employers
            .insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Employer>> {
        Ok(self.tables.lock().await.employers.get(&id).cloned())
    }

    async fn list_all(&self) -> DatabaseResult<Vec<Employer>> {
        let mut employers: Vec<Employer> =
            self.tables.lock().await.employers.values().cloned().collect();
        employers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(employers)
    }

    async fn list_for_account(&self, account_id: Uuid) -> DatabaseResult<Vec<Employer>> {
        let mut employers: Vec<Employer> = self
            .tables
            .lock()
            .await
            .employers
            .values()
            .filter(|employer| employer.account_id == Some(account_id))
            .cloned()
            .collect();
        employers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(employers)
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn create(&self, category: &NewCategory) -> DatabaseResult<Category> {
        let mut tables = self.tables.lock().await;

        for existing in tables.categories.values() {
            if existing.name == category.name {
                return Err(DatabaseError::Duplicate { field: "name" });
            }
            if existing.slug == category.slug {
                return Err(DatabaseError::Duplicate { field: "slug" });
            }
        }

        let created = Category {
            id: Uuid::new_v4(),
            name: category.name.clone(),
            slug: category.slug.clone(),
            description: category.description.clone(),
        };
        tables.categories.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Category>> {
        Ok(self.tables.lock().await.categories.get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> DatabaseResult<Option<Category>> {
        Ok(self
            .tables
            .lock()
            .await
            .categories
            .values()
            .find(|category| category.slug == slug)
            .cloned())
    }

    async fn list_all(&self) -> DatabaseResult<Vec<Category>> {
        let mut categories: Vec<Category> =
            self.tables.lock().await.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn create(&self, job: &NewJob) -> DatabaseResult<Job> {
        let created = Job {
            id: Uuid::new_v4(),
            title: job.title.clone(),
            description: job.description.clone(),
            tags: job.tags.clone(),
            salary_min: job.salary_min,
            salary_max: job.salary_max,
            salary_currency: job.salary_currency.clone(),
            apply_url: job.apply_url.clone(),
            employer_id: job.employer_id,
            employer_account_id: job.employer_account_id,
            category_id: job.category_id,
            status: job.status,
            created_at: Utc::now(),
            published_at: job.published_at,
            expires_at: job.expires_at,
            payment_completed: false,
            payment_amount: None,
            stripe_payment_intent_id: None,
            refund_requested_at: None,
            refund_reason: None,
        };
        self.tables
            .lock()
            .await
            .jobs
            .insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Job>> {
        Ok(self.tables.lock().await.jobs.get(&id).cloned())
    }

    async fn list_all(&self) -> DatabaseResult<Vec<Job>> {
        Ok(newest_first(
            self.tables.lock().await.jobs.values().cloned().collect(),
        ))
    }

    async fn list_for_account(&self, account_id: Uuid) -> DatabaseResult<Vec<Job>> {
        Ok(newest_first(
            self.tables
                .lock()
                .await
                .jobs
                .values()
                .filter(|job| job.is_owned_by(account_id))
                .cloned()
                .collect(),
        ))
    }

    async fn count_for_account(&self, account_id: Uuid) -> DatabaseResult<i64> {
        let count = self
            .tables
            .lock()
            .await
            .jobs
            .values()
            .filter(|job| job.is_owned_by(account_id))
            .count();
        Ok(count as i64)
    }

    async fn list_public(
        &self,
        search: &JobSearch,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .tables
            .lock()
            .await
            .jobs
            .values()
            .filter(|job| job.is_listed_at(now) && search.matches(job))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| Reverse((job.published_at, job.created_at)));
        Ok(jobs)
    }

    async fn update_details(
        &self,
        id: Uuid,
        changes: &JobChanges,
    ) -> DatabaseResult<Option<Job>> {
        let mut tables = self.tables.lock().await;
        let Some(job) = tables.jobs.get_mut(&id) else {
            return Ok(None);
        };

        changes.apply_to(job);
        Ok(Some(job.clone()))
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        transition: &Transition,
    ) -> DatabaseResult<Option<Job>> {
        let mut tables = self.tables.lock().await;
        let Some(job) = tables.jobs.get_mut(&id) else {
            return Ok(None);
        };

        // Check and write under the same lock
        if !transition.guard_holds(job) {
            return Ok(None);
        }
        transition.apply_to(job);
        Ok(Some(job.clone()))
    }

    async fn record_payment(
        &self,
        id: Uuid,
        reference: &str,
        amount: i64,
    ) -> DatabaseResult<Option<Job>> {
        let mut tables = self.tables.lock().await;
        let Some(job) = tables
            .jobs
            .get_mut(&id)
            .filter(|job| job.status == JobStatus::Draft)
        else {
            return Ok(None);
        };

        job.stripe_payment_intent_id = Some(reference.to_string());
        job.payment_amount = Some(amount);
        Ok(Some(job.clone()))
    }
}
