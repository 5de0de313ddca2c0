//! In-memory storage backend for Donorcast.
//!
//! Implements the token store, audit log and subscription store traits from
//! `donorcast-notifications` on top of process memory. Intended for local
//! development and tests; nothing survives a restart.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use donorcast_db_memory::InMemoryStore;
//! use donorcast_notifications::{DryRunGateway, NotificationContext};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let ctx = NotificationContext::from_store(store, Arc::new(DryRunGateway::new()));
//! ```

pub mod storage;

pub use storage::InMemoryStore;

/// Creates a new shareable in-memory store.
pub fn create_store() -> std::sync::Arc<InMemoryStore> {
    std::sync::Arc::new(InMemoryStore::new())
}
