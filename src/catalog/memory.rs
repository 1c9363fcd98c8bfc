//! In-memory catalog for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{Catalog, CatalogError, Result, SourceTable, TableIdent};
use crate::record::{Column, SourceBatch, SourceRecord, SourceSchema, TransformColumns, Value};

struct MemoryTableData {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

/// Catalog holding tables as rows of values.
///
/// Counts every row handed out by a scan so tests can assert that a failed
/// run read nothing.
#[derive(Default)]
pub struct MemoryCatalog {
    tables: HashMap<TableIdent, Arc<MemoryTableData>>,
    rows_read: Arc<AtomicUsize>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table.
    pub fn with_table(
        mut self,
        ident: TableIdent,
        columns: Vec<Column>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.tables
            .insert(ident, Arc::new(MemoryTableData { columns, rows }));
        self
    }

    /// Total rows returned by scans so far.
    pub fn rows_read(&self) -> usize {
        self.rows_read.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn load_table(
        &self,
        ident: &TableIdent,
        columns: &TransformColumns,
    ) -> Result<Box<dyn SourceTable>> {
        let data = self
            .tables
            .get(ident)
            .ok_or_else(|| CatalogError::TableNotFound(ident.clone()))?;

        let schema = SourceSchema::resolve(data.columns.clone(), columns)?;

        Ok(Box::new(MemoryTable {
            ident: ident.clone(),
            schema: Arc::new(schema),
            data: data.clone(),
            rows_read: self.rows_read.clone(),
        }))
    }
}

struct MemoryTable {
    ident: TableIdent,
    schema: Arc<SourceSchema>,
    data: Arc<MemoryTableData>,
    rows_read: Arc<AtomicUsize>,
}

#[async_trait]
impl SourceTable for MemoryTable {
    fn ident(&self) -> &TableIdent {
        &self.ident
    }

    fn schema(&self) -> &Arc<SourceSchema> {
        &self.schema
    }

    async fn scan(&self) -> Result<SourceBatch> {
        let records = self
            .data
            .rows
            .iter()
            .map(|row| SourceRecord::new(self.schema.clone(), row.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.rows_read.fetch_add(records.len(), Ordering::SeqCst);

        Ok(SourceBatch {
            schema: self.schema.clone(),
            records,
        })
    }
}
