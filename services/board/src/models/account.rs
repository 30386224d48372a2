//! Employer account models

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Self-registered employer login
#[derive(Debug, Clone, Serialize)]
pub struct EmployerAccount {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub company_name: String,
    pub contact_name: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Registration payload, password already hashed
#[derive(Debug, Clone)]
pub struct NewEmployerAccount {
    pub email: String,
    pub password_hash: String,
    pub company_name: String,
    pub contact_name: String,
    pub phone: Option<String>,
    pub website: Option<String>,
}
