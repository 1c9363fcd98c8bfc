//! Source catalogs.
//!
//! A [`Catalog`] resolves a namespace-qualified table name to a
//! [`SourceTable`]; scanning the table yields its rows as a [`SourceBatch`].
//! Lookup and scan are separate so that a missing table is reported before
//! any data is read.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::record::{RecordError, SchemaError, SourceBatch, SourceSchema, TransformColumns};

mod data_file;
mod manifest;
pub mod memory;
pub mod warehouse;

pub use memory::MemoryCatalog;
pub use warehouse::WarehouseCatalog;

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur resolving or reading a source table.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Invalid table identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Table not found: {0}")]
    TableNotFound(TableIdent),

    #[error("Invalid table metadata in {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Avro error: {0}")]
    Avro(#[from] apache_avro::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Source schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Invalid source row: {0}")]
    Record(#[from] RecordError),

    #[error("Scan task failed: {0}")]
    Task(String),
}

impl CatalogError {
    /// True when the table itself could not be resolved.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            CatalogError::TableNotFound(_) | CatalogError::InvalidIdentifier(_)
        )
    }
}

/// Namespace-qualified table name, e.g. `sales.silver_orders`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdent {
    pub namespace: Vec<String>,
    pub name: String,
}

impl TableIdent {
    pub fn new(namespace: Vec<String>, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    /// Parse a dotted identifier.
    ///
    /// A leading part equal to `catalog_name` is dropped, so `local.silver_orders`
    /// resolves to table `silver_orders` in the root namespace of catalog `local`.
    pub fn parse(identifier: &str, catalog_name: Option<&str>) -> Result<Self> {
        let mut parts: Vec<&str> = identifier.split('.').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(CatalogError::InvalidIdentifier(identifier.to_string()));
        }

        if let Some(catalog) = catalog_name {
            if parts.len() > 1 && parts[0] == catalog {
                parts.remove(0);
            }
        }

        let name = parts
            .pop()
            .ok_or_else(|| CatalogError::InvalidIdentifier(identifier.to_string()))?;

        Ok(Self {
            namespace: parts.into_iter().map(str::to_string).collect(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.namespace {
            write!(f, "{}.", part)?;
        }
        f.write_str(&self.name)
    }
}

/// Registry mapping table names to readable tables.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve a table and its schema without reading any rows.
    ///
    /// Fails with [`CatalogError::TableNotFound`] if the table does not exist.
    async fn load_table(
        &self,
        ident: &TableIdent,
        columns: &TransformColumns,
    ) -> Result<Box<dyn SourceTable>>;
}

/// A resolved, read-only source table.
#[async_trait]
pub trait SourceTable: Send + Sync {
    fn ident(&self) -> &TableIdent;

    fn schema(&self) -> &Arc<SourceSchema>;

    /// Read every row of the table's current state.
    async fn scan(&self) -> Result<SourceBatch>;
}
