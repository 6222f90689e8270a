//! Database layer
//!
//! SQLite storage for users, sessions, document sequences and certificates.
//!
//! # Usage
//!
//! ```ignore
//! use dermolo::config::DatabaseConfig;
//! use dermolo::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DatabasePool, DynDatabasePool, SqliteDatabase};
