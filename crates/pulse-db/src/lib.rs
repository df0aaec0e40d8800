//! # pulse-db
//!
//! PostgreSQL implementation of the collaborators the delivery core calls
//! into: identity resolution, chat membership and chat persistence.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pulse_db::{create_pool, DatabaseConfig, PgDirectory};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = create_pool(&DatabaseConfig::default()).await?;
//!     let directory = Arc::new(PgDirectory::new(pool));
//!
//!     let context = ServiceContextBuilder::new()
//!         .collaborators(directory)
//!         // ...
//!         .build()?;
//!     Ok(())
//! }
//! ```
//!
//! The schema lives in `migrations/`.

pub mod mappers;
pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used types
pub use pool::{create_pool, DatabaseConfig, PgPool};
pub use repositories::PgDirectory;

/// Schema applied by deployments and the database tests
pub const SCHEMA: &str = include_str!("../migrations/0001_delivery_directory.sql");
