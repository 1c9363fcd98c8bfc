//! Destination sinks.
//!
//! A [`SinkConnector`] opens a connection to the destination; the resulting
//! [`Sink`] checks the destination table against the output shape
//! ([`Sink::prepare`]) and appends rows ([`Sink::append`]). Appends never
//! update or delete existing rows, so running a stage twice writes every
//! qualifying row twice.

use std::fmt;

use async_trait::async_trait;

use crate::record::{DerivedRecord, OutputSchema};

pub mod memory;
pub mod schema;
#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub mod sql;

pub use memory::{MemoryConnector, MemorySink};
pub use schema::{plan_columns, DestinationColumn, WritePlan};

/// Result type for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors that can occur writing to a destination.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Destination unreachable, timed out, or rejected the credentials.
    #[error("Connection to {target} failed: {message}")]
    Connection { target: String, message: String },

    /// Destination table shape is incompatible with the output rows.
    #[error("Destination table {table} does not match output: {reason}")]
    SchemaMismatch { table: String, reason: String },

    #[error("Write to {table} failed: {message}")]
    Write { table: String, message: String },

    #[cfg(any(feature = "postgres", feature = "sqlite"))]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Optionally schema-qualified destination table, e.g. `public.gold_orders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationTable {
    pub schema: Option<String>,
    pub name: String,
}

impl DestinationTable {
    /// Parse `table` or `schema.table`.
    pub fn parse(identifier: &str) -> Option<Self> {
        let parts: Vec<&str> = identifier.split('.').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return None;
        }
        match parts.as_slice() {
            [name] => Some(Self {
                schema: None,
                name: name.to_string(),
            }),
            [schema, name] => Some(Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for DestinationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Opens connections to a destination.
#[async_trait]
pub trait SinkConnector: Send + Sync {
    /// Human-readable destination address, free of credentials.
    fn target(&self) -> String;

    /// Connect to the destination.
    ///
    /// Fails with [`SinkError::Connection`] if the destination is unreachable
    /// or authentication fails.
    async fn connect(&self) -> Result<Box<dyn Sink>>;
}

/// An open destination.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Verify (or create) the destination table for the given output shape.
    ///
    /// Fails with [`SinkError::SchemaMismatch`] before anything is written.
    async fn prepare(&self, output: &OutputSchema) -> Result<WritePlan>;

    /// Append all records as new rows. Returns the number of rows written.
    async fn append(&self, plan: &WritePlan, records: &[DerivedRecord]) -> Result<u64>;
}
