//! SQLite backend for the Tempora document store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every conditional write runs inside a
//! single SQLite transaction, which gives the per-key compare-and-swap the
//! temporal engine relies on.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
