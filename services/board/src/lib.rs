//! Self-hostable job board
//!
//! Employers register, post jobs as drafts and publish them by paying;
//! admins curate everything. Jobs expire after a fixed period and can be
//! refunded once, shortly after publication.

pub mod error;
pub mod forms;
pub mod gate;
pub mod jobs;
pub mod lifecycle;
pub mod models;
pub mod payment;
pub mod repositories;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
