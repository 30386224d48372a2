//! Common library for the job board
//!
//! This crate provides functionality shared by the board services:
//! database connectivity, the persistence error taxonomy, and the
//! process-wide configuration that every component receives by injection.

pub mod config;
pub mod database;
pub mod error;

pub use config::{BoardConfig, StorageBackend};
