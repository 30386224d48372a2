//! Domain models for the job board

pub mod account;
pub mod category;
pub mod employer;
pub mod job;

pub use account::{EmployerAccount, NewEmployerAccount};
pub use category::{Category, NewCategory};
pub use employer::{Employer, NewEmployer};
pub use job::{Job, JobChanges, JobSearch, JobStatus, JobView, NewJob};
