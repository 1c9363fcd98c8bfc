//! In-memory destination for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    plan_columns, DestinationColumn, DestinationTable, Result, Sink, SinkConnector, SinkError,
    WritePlan,
};
use crate::record::{DerivedRecord, OutputSchema, Value};

#[derive(Default)]
struct MemoryDestination {
    columns: RwLock<Option<Vec<DestinationColumn>>>,
    rows: RwLock<Vec<Vec<Value>>>,
    connects: AtomicUsize,
}

/// Connector for an in-memory table.
///
/// Clones share the same table, so a test can keep one handle and inspect
/// what a stage wrote through another.
#[derive(Clone)]
pub struct MemoryConnector {
    table: DestinationTable,
    destination: Arc<MemoryDestination>,
    refuse_connections: bool,
    fail_writes: bool,
    create_table: bool,
}

impl MemoryConnector {
    pub fn new(table: DestinationTable) -> Self {
        Self {
            table,
            destination: Arc::default(),
            refuse_connections: false,
            fail_writes: false,
            create_table: true,
        }
    }

    /// Behave like an unreachable destination.
    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    /// Reject every append, storing nothing.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn without_create_table(mut self) -> Self {
        self.create_table = false;
        self
    }

    /// Pretend the table already exists with these columns. Declared types
    /// are lowercase [`ColumnType`](crate::record::ColumnType) names.
    pub fn with_existing_columns(mut self, columns: Vec<DestinationColumn>) -> Self {
        self.destination = Arc::new(MemoryDestination {
            columns: RwLock::new(Some(columns)),
            ..MemoryDestination::default()
        });
        self
    }

    /// Rows appended so far, in output column order.
    pub async fn rows(&self) -> Vec<Vec<Value>> {
        self.destination.rows.read().await.clone()
    }

    /// Column names of the table, if it exists.
    pub async fn column_names(&self) -> Option<Vec<String>> {
        self.destination
            .columns
            .read()
            .await
            .as_ref()
            .map(|columns| columns.iter().map(|c| c.name.clone()).collect())
    }

    pub fn connect_attempts(&self) -> usize {
        self.destination.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SinkConnector for MemoryConnector {
    fn target(&self) -> String {
        format!("memory:{}", self.table)
    }

    async fn connect(&self) -> Result<Box<dyn Sink>> {
        self.destination.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connections {
            return Err(SinkError::Connection {
                target: self.target(),
                message: "connection refused".to_string(),
            });
        }
        Ok(Box::new(MemorySink {
            connector: self.clone(),
        }))
    }
}

/// Sink writing into a [`MemoryConnector`]'s table.
pub struct MemorySink {
    connector: MemoryConnector,
}

#[async_trait]
impl Sink for MemorySink {
    async fn prepare(&self, output: &OutputSchema) -> Result<WritePlan> {
        let table = &self.connector.table;
        let mut columns = self.connector.destination.columns.write().await;

        match columns.as_ref() {
            Some(existing) => {
                let targets = plan_columns(table, output, existing, |column_type, declared| {
                    column_type.to_string() == declared
                })?;
                Ok(WritePlan::new(output.clone(), targets))
            }
            None if self.connector.create_table => {
                *columns = Some(
                    output
                        .columns()
                        .iter()
                        .map(|c| DestinationColumn {
                            name: c.name.clone(),
                            data_type: c.column_type.to_string(),
                            nullable: c.nullable,
                            has_default: false,
                        })
                        .collect(),
                );
                Ok(WritePlan::for_created_table(output.clone()))
            }
            None => Err(SinkError::SchemaMismatch {
                table: table.to_string(),
                reason: "table does not exist and create_table is disabled".to_string(),
            }),
        }
    }

    async fn append(&self, plan: &WritePlan, records: &[DerivedRecord]) -> Result<u64> {
        if self.connector.fail_writes {
            return Err(SinkError::Write {
                table: self.connector.table.to_string(),
                message: "write rejected".to_string(),
            });
        }

        let mut rows = self.connector.destination.rows.write().await;
        rows.extend(records.iter().map(|r| plan.output().row(r)));
        Ok(records.len() as u64)
    }
}
