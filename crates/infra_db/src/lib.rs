//! Infrastructure Database Layer
//!
//! This crate provides PostgreSQL persistence for the claims pipeline,
//! implementing the visit store and run store ports over SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: the domain layers see only the
//! port traits, and each repository here maps rows to aggregates at the
//! boundary. Queries are built at runtime so the crate compiles without a
//! live database.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{DatabaseConfig, create_pool, run_migrations, VisitRepository};
//!
//! let pool = create_pool(DatabaseConfig::new(url)).await?;
//! run_migrations(&pool).await?;
//! let visits = VisitRepository::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;

pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use error::DatabaseError;
pub use repositories::{RunRepository, VisitRepository};
