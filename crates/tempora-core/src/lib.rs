//! Core types and trait definitions for Tempora, a bitemporal versioning layer
//! over a document store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod document;
pub mod error;
pub mod etag;
pub mod key;
pub mod memory;
pub mod metadata;
pub mod policy;
pub mod store;

pub use error::{Error, Result};
