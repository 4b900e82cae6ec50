//! SQLite backend for the Stockroom ledger.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every mutation is one `BEGIN
//! IMMEDIATE` transaction: SQLite's single writer lock is the row lock, and
//! `busy_timeout` bounds the wait for it.

mod audit;
mod cart;
mod catalog;
mod credential;
mod demand;
mod encode;
mod ledger;
mod reservation;
mod schema;
mod store;
mod transfer;

pub mod error;
pub mod hooks;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
