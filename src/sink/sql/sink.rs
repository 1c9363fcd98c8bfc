//! Unified SQL Sink implementation.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.

use std::fmt::Display;
use std::marker::PhantomData;

use sea_query_binder::SqlxValues;

use super::query::{create_table, insert_statements, rows_per_statement};
use super::SqlDatabase;
use crate::config::{ConfigError, DestinationConfig};
use crate::record::{DerivedRecord, OutputSchema};
use crate::sink::{plan_columns, DestinationTable, SinkError, WritePlan};

/// SQL-based implementation of Sink.
///
/// This generic implementation works with any SQL database that implements
/// the `SqlDatabase` trait (PostgreSQL, SQLite).
pub struct SqlSink<DB: SqlDatabase> {
    pub(super) pool: DB::Pool,
    pub(super) table: DestinationTable,
    batch_size: usize,
    create_table: bool,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlSink<DB> {
    /// Create a new SQL sink writing to `table` through `pool`.
    pub fn new(pool: DB::Pool, table: DestinationTable, batch_size: usize, create_table: bool) -> Self {
        Self {
            pool,
            table,
            batch_size: batch_size.max(1),
            create_table,
            _marker: PhantomData,
        }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }

    pub fn table(&self) -> &DestinationTable {
        &self.table
    }

    fn write_error(&self, err: impl Display) -> SinkError {
        SinkError::Write {
            table: self.table.to_string(),
            message: err.to_string(),
        }
    }
}

/// Connects a [`SqlSink`] from destination configuration.
pub struct SqlConnector<DB: SqlDatabase> {
    pub(super) config: DestinationConfig,
    pub(super) table: DestinationTable,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlConnector<DB> {
    pub fn new(config: DestinationConfig) -> Result<Self, ConfigError> {
        let table = DestinationTable::parse(&config.table).ok_or_else(|| {
            ConfigError::Invalid(format!("destination.table '{}' is not valid", config.table))
        })?;
        Ok(Self {
            config,
            table,
            _marker: PhantomData,
        })
    }

    pub(super) fn connection_error(&self, err: impl Display) -> SinkError {
        SinkError::Connection {
            target: self.config.target(),
            message: err.to_string(),
        }
    }

    pub(super) fn sink(&self, pool: DB::Pool) -> SqlSink<DB> {
        SqlSink::new(
            pool,
            self.table.clone(),
            self.config.batch_size,
            self.config.create_table,
        )
    }
}

/// Macro to implement Sink for a specific SQL backend.
///
/// The backend module provides `describe()`, returning the destination
/// table's columns or `None` when the table does not exist.
macro_rules! impl_sql_sink {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::sink::Sink for SqlSink<$db_type> {
            async fn prepare(&self, output: &OutputSchema) -> crate::sink::Result<WritePlan> {
                match self.describe().await? {
                    Some(existing) => {
                        let targets = plan_columns(
                            &self.table,
                            output,
                            &existing,
                            <$db_type>::type_compatible,
                        )?;
                        tracing::debug!(
                            table = %self.table,
                            columns = targets.len(),
                            "Destination table matches output"
                        );
                        Ok(WritePlan::new(output.clone(), targets))
                    }
                    None if self.create_table => {
                        let sql = <$db_type>::build_create(create_table(&self.table, output));
                        sqlx::query(&sql).execute(&self.pool).await?;
                        tracing::info!(table = %self.table, "Created destination table");
                        Ok(WritePlan::for_created_table(output.clone()))
                    }
                    None => Err(SinkError::SchemaMismatch {
                        table: self.table.to_string(),
                        reason: "table does not exist and create_table is disabled".to_string(),
                    }),
                }
            }

            async fn append(
                &self,
                plan: &WritePlan,
                records: &[DerivedRecord],
            ) -> crate::sink::Result<u64> {
                if records.is_empty() {
                    return Ok(0);
                }

                let rows = rows_per_statement::<$db_type>(
                    self.batch_size,
                    plan.target_columns().len(),
                );
                // Built up front: sea-query statements are not Send.
                let statements: Vec<(String, SqlxValues)> =
                    insert_statements(&self.table, plan, records, rows)
                        .map_err(|e| self.write_error(e))?
                        .into_iter()
                        .map(<$db_type>::build_insert)
                        .collect();

                // All chunks commit together or not at all.
                let mut tx = self.pool.begin().await.map_err(|e| self.write_error(e))?;
                let mut written = 0u64;
                for (sql, values) in statements {
                    let result = sqlx::query_with(&sql, values)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| self.write_error(e))?;
                    written += result.rows_affected();
                }
                tx.commit().await.map_err(|e| self.write_error(e))?;

                Ok(written)
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_sql_sink!(super::postgres::Postgres, "postgres");
impl_sql_sink!(super::sqlite::Sqlite, "sqlite");
