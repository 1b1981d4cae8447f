//! SQLite backend for the poke store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write is a single SQLite
//! transaction.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, ErrorKind, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
