//! Core types and trait definitions for the Stockroom ledger.
//!
//! This crate is deliberately free of database and I/O dependencies. It holds
//! the domain model, the status transition tables, the audit-chain hashing
//! rules and the backend traits. Storage backends (e.g.
//! `stockroom-store-sqlite`) implement the traits; callers depend on the
//! traits, never on a concrete backend.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod actor;
pub mod article;
pub mod audit;
pub mod cart;
pub mod collab;
pub mod demand;
pub mod error;
pub mod policy;
pub mod reservation;
pub mod stock;
pub mod store;
pub mod transfer;

pub use error::{Error, ErrorKind, Result};
