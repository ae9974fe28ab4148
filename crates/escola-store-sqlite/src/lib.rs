//! SQLite backend for the Escola enrollment intake.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. One store owns one connection; the
//! transaction handle [`SqliteTx`] holds the store's gate for its whole
//! lifetime so nothing else interleaves with an open transaction.

mod encode;
mod queue;
mod schema;
mod store;
mod tx;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, TableCounts};
pub use tx::SqliteTx;
