//! Core types and trait definitions for the Escola enrollment intake.
//!
//! This crate is deliberately free of runtime and database dependencies.
//! The workflow, the SQLite backend and the CLI all depend on it; it depends
//! on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod cpf;
pub mod directory;
pub mod document;
pub mod enrollment;
pub mod error;
pub mod materialization;
pub mod storage;
pub mod store;
pub mod student;

pub use error::{Error, Result};
