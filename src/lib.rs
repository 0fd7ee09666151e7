//! Cartera is the ledger core of a personal-finance tracker.
//!
//! The crate manages financial products (accounts), the transactions that
//! move money through them, and atomic two-sided transfers between them. It
//! keeps each product's cached balance consistent with its transaction set,
//! enforces a non-negative-balance rule for cash holdings, and serves
//! cursor-paginated, filtered transaction listings with a stable
//! `(date DESC, id DESC)` order.
//!
//! The crate does not speak HTTP: callers (the API's request handlers)
//! resolve an authenticated user and a database connection, invoke an
//! operation, and map the returned data or [Error] to their wire format.
//! The only outbound dependency is the injected exchange rate source in
//! [trm].

#![warn(missing_docs)]

mod config;
mod database_id;
mod db;
mod error;
mod money;

pub mod logging;
pub mod product;
pub mod transaction;
pub mod transfer;
pub mod trm;

pub use config::AppConfig;
pub use database_id::{DatabaseId, ProductId, TransactionId};
pub use db::{initialize, with_transaction};
pub use error::Error;
pub use money::Money;
