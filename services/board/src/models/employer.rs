//! Company profiles

use serde::Serialize;
use uuid::Uuid;

/// Company profile a job is posted under
#[derive(Debug, Clone, Serialize)]
pub struct Employer {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub description: Option<String>,
    /// Owning account; `None` for admin-created employers
    pub account_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewEmployer {
    pub name: String,
    pub website: Option<String>,
    pub description: Option<String>,
    pub account_id: Option<Uuid>,
}
