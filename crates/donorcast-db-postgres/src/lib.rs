//! PostgreSQL storage backend for Donorcast.
//!
//! Implements the token store, audit log and subscription store traits from
//! `donorcast-notifications` on three relational tables: `users`,
//! `notifications` and `topic_subscriptions`. Timestamps are assigned by the
//! database with `NOW()`.
//!
//! # Example
//!
//! ```ignore
//! use donorcast_db_postgres::{PostgresConfig, PostgresStore};
//!
//! let config = PostgresConfig::new("postgres://donor:pw@localhost/donorcast").with_pool_size(5);
//! let store = PostgresStore::connect(&config).await?;
//! ```

pub mod config;
pub mod error;
pub mod pool;
pub mod schema;
pub mod storage;

pub use config::PostgresConfig;
pub use error::{PostgresError, Result};
pub use pool::{create_pool, mask_password};
pub use schema::ensure_schema;
pub use storage::PostgresStore;
