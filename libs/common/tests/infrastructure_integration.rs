//! Integration tests for the infrastructure components
//!
//! These tests verify that the PostgreSQL database is properly configured
//! and accessible. They need a running server and are ignored by default:
//! `cargo test -p common -- --ignored`.

use common::database::{DatabaseConfig, health_check, init_pool};
use sqlx::Row;

/// Test that verifies PostgreSQL is accessible and answers queries
#[tokio::test]
#[ignore = "requires a running PostgreSQL at DATABASE_URL"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    assert!(health_check(&pool).await?, "Database health check failed");

    let row = sqlx::query("SELECT 1 as result").fetch_one(&pool).await?;
    let result: i32 = row.get("result");
    assert_eq!(result, 1, "PostgreSQL simple query test failed");

    Ok(())
}
