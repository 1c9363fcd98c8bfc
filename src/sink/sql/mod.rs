//! Unified SQL sink implementations.
//!
//! This module provides shared implementations for SQL-based destinations
//! (PostgreSQL, SQLite). The implementations are parameterized by database type
//! using the `SqlDatabase` trait.

mod query;
mod sink;

pub use query::SqlDatabase;
pub use sink::{SqlConnector, SqlSink};

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;
