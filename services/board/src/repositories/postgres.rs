//! PostgreSQL repositories

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{AccountRepository, CategoryRepository, EmployerRepository, JobRepository};
use crate::lifecycle::Transition;
use crate::models::{
    Category, Employer, EmployerAccount, Job, JobChanges, JobSearch, JobStatus, NewCategory,
    NewEmployer, NewEmployerAccount, NewJob,
};

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, company_name, contact_name, phone, \
     website, is_active, created_at, last_login";

const EMPLOYER_COLUMNS: &str = "id, name, website, description, account_id";

const CATEGORY_COLUMNS: &str = "id, name, slug, description";

const JOB_COLUMNS: &str = "id, title, description, tags, salary_min, salary_max, \
     salary_currency, apply_url, employer_id, employer_account_id, category_id, status, \
     created_at, published_at, expires_at, payment_completed, payment_amount, \
     stripe_payment_intent_id, refund_requested_at, refund_reason";

/// Repositories over a shared connection pool
#[derive(Clone)]
pub struct PgRepositories {
    pool: PgPool,
}

impl PgRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn account_from_row(row: &PgRow) -> EmployerAccount {
    EmployerAccount {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        company_name: row.get("company_name"),
        contact_name: row.get("contact_name"),
        phone: row.get("phone"),
        website: row.get("website"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        last_login: row.get("last_login"),
    }
}

fn employer_from_row(row: &PgRow) -> Employer {
    Employer {
        id: row.get("id"),
        name: row.get("name"),
        website: row.get("website"),
        description: row.get("description"),
        account_id: row.get("account_id"),
    }
}

fn category_from_row(row: &PgRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
    }
}

fn job_from_row(row: &PgRow) -> DatabaseResult<Job> {
    let status: String = row.get("status");
    let status = status.parse::<JobStatus>().map_err(DatabaseError::Decode)?;

    Ok(Job {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        tags: row.get("tags"),
        salary_min: row.get("salary_min"),
        salary_max: row.get("salary_max"),
        salary_currency: row.get("salary_currency"),
        apply_url: row.get("apply_url"),
        employer_id: row.get("employer_id"),
        employer_account_id: row.get("employer_account_id"),
        category_id: row.get("category_id"),
        status,
        created_at: row.get("created_at"),
        published_at: row.get("published_at"),
        expires_at: row.get("expires_at"),
        payment_completed: row.get("payment_completed"),
        payment_amount: row.get("payment_amount"),
        stripe_payment_intent_id: row.get("stripe_payment_intent_id"),
        refund_requested_at: row.get("refund_requested_at"),
        refund_reason: row.get("refund_reason"),
    })
}

fn jobs_from_rows(rows: &[PgRow]) -> DatabaseResult<Vec<Job>> {
    rows.iter().map(job_from_row).collect()
}

#[async_trait]
impl AccountRepository for PgRepositories {
    async fn create(&self, account: &NewEmployerAccount) -> DatabaseResult<EmployerAccount> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO employer_accounts
                (email, password_hash, company_name, contact_name, phone, website)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.company_name)
        .bind(&account.contact_name)
        .bind(&account.phone)
        .bind(&account.website)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_write(e, "email"))?;

        Ok(account_from_row(&row))
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<EmployerAccount>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM employer_accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(account_from_row))
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<EmployerAccount>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM employer_accounts WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(account_from_row))
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> DatabaseResult<()> {
        sqlx::query("UPDATE employer_accounts SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl EmployerRepository for PgRepositories {
    async fn create(&self, employer: &NewEmployer) -> DatabaseResult<Employer> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO employers (name, website, description, account_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {EMPLOYER_COLUMNS}
            "#
        ))
        .bind(&employer.name)
        .bind(&employer.website)
        .bind(&employer.description)
        .bind(employer.account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(employer_from_row(&row))
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Employer>> {
        let row = sqlx::query(&format!(
            "SELECT {EMPLOYER_COLUMNS} FROM employers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(employer_from_row))
    }

    async fn list_all(&self) -> DatabaseResult<Vec<Employer>> {
        let rows = sqlx::query(&format!(
            "SELECT {EMPLOYER_COLUMNS} FROM employers ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(employer_from_row).collect())
    }

    async fn list_for_account(&self, account_id: Uuid) -> DatabaseResult<Vec<Employer>> {
        let rows = sqlx::query(&format!(
            "SELECT {EMPLOYER_COLUMNS} FROM employers WHERE account_id = $1 ORDER BY name"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(employer_from_row).collect())
    }
}

#[async_trait]
impl CategoryRepository for PgRepositories {
    async fn create(&self, category: &NewCategory) -> DatabaseResult<Category> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO categories (name, slug, description)
            VALUES ($1, $2, $3)
            RETURNING {CATEGORY_COLUMNS}
            "#
        ))
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_write(e, "name"))?;

        Ok(category_from_row(&row))
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(category_from_row))
    }

    async fn find_by_slug(&self, slug: &str) -> DatabaseResult<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(category_from_row))
    }

    async fn list_all(&self) -> DatabaseResult<Vec<Category>> {
        let rows = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(category_from_row).collect())
    }
}

#[async_trait]
impl JobRepository for PgRepositories {
    async fn create(&self, job: &NewJob) -> DatabaseResult<Job> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO jobs
                (title, description, tags, salary_min, salary_max, salary_currency,
                 apply_url, employer_id, employer_account_id, category_id, status,
                 published_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(&job.title)
        .bind(&job.description)
        .bind(&job.tags)
        .bind(job.salary_min)
        .bind(job.salary_max)
        .bind(&job.salary_currency)
        .bind(&job.apply_url)
        .bind(job.employer_id)
        .bind(job.employer_account_id)
        .bind(job.category_id)
        .bind(job.status.as_str())
        .bind(job.published_at)
        .bind(job.expires_at)
        .fetch_one(&self.pool)
        .await?;

        job_from_row(&row)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_all(&self) -> DatabaseResult<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        jobs_from_rows(&rows)
    }

    async fn list_for_account(&self, account_id: Uuid) -> DatabaseResult<Vec<Job>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE employer_account_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        jobs_from_rows(&rows)
    }

    async fn count_for_account(&self, account_id: Uuid) -> DatabaseResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM jobs WHERE employer_account_id = $1")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }

    async fn list_public(
        &self,
        search: &JobSearch,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Vec<Job>> {
        let pattern = search.q.as_ref().map(|q| format!("%{}%", q));

        // bool_and over an empty tag list is NULL, which passes
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE status = 'published'
              AND (expires_at IS NULL OR expires_at > $1)
              AND ($2::text IS NULL OR title ILIKE $2 OR tags ILIKE $2)
              AND ($3::uuid IS NULL OR category_id = $3)
              AND (SELECT bool_and(COALESCE(tags, '') ILIKE '%' || tag || '%')
                   FROM unnest($4::text[]) AS tag) IS NOT FALSE
            ORDER BY published_at DESC NULLS LAST, created_at DESC
            "#
        ))
        .bind(now)
        .bind(pattern)
        .bind(search.category_id)
        .bind(&search.tags)
        .fetch_all(&self.pool)
        .await?;

        jobs_from_rows(&rows)
    }

    async fn update_details(
        &self,
        id: Uuid,
        changes: &JobChanges,
    ) -> DatabaseResult<Option<Job>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                tags = COALESCE($4, tags),
                salary_min = COALESCE($5, salary_min),
                salary_max = COALESCE($6, salary_max),
                apply_url = COALESCE($7, apply_url),
                employer_id = COALESCE($8, employer_id),
                category_id = COALESCE($9, category_id),
                expires_at = COALESCE($10, expires_at)
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(&changes.tags)
        .bind(changes.salary_min)
        .bind(changes.salary_max)
        .bind(&changes.apply_url)
        .bind(changes.employer_id)
        .bind(changes.category_id)
        .bind(changes.expires_at)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        transition: &Transition,
    ) -> DatabaseResult<Option<Job>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs SET
                status = $2,
                published_at = COALESCE(published_at, $3),
                expires_at = COALESCE(expires_at, $4),
                payment_completed = payment_completed OR $5,
                refund_requested_at = COALESCE($6, refund_requested_at),
                refund_reason = CASE WHEN $6::timestamptz IS NULL THEN refund_reason ELSE $7 END
            WHERE id = $1
              AND status = $8
              AND ($9::timestamptz IS NULL OR published_at >= $9)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(transition.to.as_str())
        .bind(transition.published_at)
        .bind(transition.expires_at)
        .bind(transition.payment_completed)
        .bind(transition.refund_requested_at)
        .bind(&transition.refund_reason)
        .bind(transition.from.as_str())
        .bind(transition.published_after)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn record_payment(
        &self,
        id: Uuid,
        reference: &str,
        amount: i64,
    ) -> DatabaseResult<Option<Job>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs SET stripe_payment_intent_id = $2, payment_amount = $3
            WHERE id = $1 AND status = 'draft'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(reference)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }
}
