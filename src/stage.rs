//! The silver-to-gold batch stage.
//!
//! Resolves the source table, checks the destination, then reads, filters,
//! derives and appends in a single pass. Nothing is retried or checkpointed:
//! a failed run leaves the destination as it was, and a repeated successful
//! run appends every qualifying row again.

use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogError, TableIdent};
use crate::config::{Config, ConfigError};
use crate::record::{OutputSchema, TransformColumns};
use crate::sink::{SinkConnector, SinkError};
use crate::transform::transform;

/// Inputs of one stage run.
#[derive(Debug, Clone)]
pub struct StageConfig {
    /// Source table, `[catalog.]namespace.table`.
    pub source_table: String,
    /// Catalog name stripped from the front of `source_table`.
    pub catalog_name: Option<String>,
    pub columns: TransformColumns,
}

impl StageConfig {
    pub fn new(source_table: impl Into<String>) -> Self {
        Self {
            source_table: source_table.into(),
            catalog_name: None,
            columns: TransformColumns::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            source_table: config.source.table.clone(),
            catalog_name: Some(config.source.catalog_name.clone()),
            columns: config.transform.columns(),
        }
    }
}

/// Row counts of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    pub rows_read: usize,
    /// Rows removed by the positive-amount filter.
    pub rows_dropped: usize,
    pub rows_written: u64,
    /// Written rows whose order timestamp, and so order date, was null.
    pub null_order_dates: usize,
}

/// Errors that abort a stage run.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The source table could not be resolved. No rows were read.
    #[error("Source lookup failed: {0}")]
    Lookup(#[source] CatalogError),

    #[error("Source read failed: {0}")]
    Read(#[source] CatalogError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl StageError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            StageError::Config(_) => 2,
            StageError::Lookup(_) => 3,
            StageError::Read(_) => 4,
            StageError::Sink(SinkError::Connection { .. }) => 5,
            StageError::Sink(SinkError::SchemaMismatch { .. }) => 6,
            StageError::Sink(_) => 7,
        }
    }
}

/// Run the stage once.
///
/// The source table is resolved and the destination connected and checked
/// before any row is read, so lookup, connection and schema failures leave
/// both sides untouched.
#[tracing::instrument(name = "stage.run", skip_all, fields(source = %config.source_table))]
pub async fn run_stage(
    config: &StageConfig,
    catalog: &dyn Catalog,
    connector: &dyn SinkConnector,
) -> Result<StageReport, StageError> {
    let ident = TableIdent::parse(&config.source_table, config.catalog_name.as_deref())
        .map_err(StageError::Lookup)?;
    let table = catalog
        .load_table(&ident, &config.columns)
        .await
        .map_err(StageError::Lookup)?;

    let output = OutputSchema::new(table.schema().clone(), &config.columns.order_date);
    if table
        .schema()
        .columns()
        .iter()
        .any(|c| c.name == config.columns.order_date)
    {
        warn!(
            column = %config.columns.order_date,
            "Source column replaced by derived order date"
        );
    }

    info!(destination = %connector.target(), "Connecting to destination");
    let sink = connector.connect().await?;
    let plan = sink.prepare(&output).await?;

    let batch = table.scan().await.map_err(StageError::Read)?;
    let rows_read = batch.records.len();
    info!(table = %ident, rows = rows_read, "Source table read");

    let derived = transform(batch.records);
    let rows_dropped = rows_read - derived.len();
    let null_order_dates = derived.iter().filter(|r| r.order_date.is_none()).count();

    let rows_written = sink.append(&plan, &derived).await?;

    let report = StageReport {
        rows_read,
        rows_dropped,
        rows_written,
        null_order_dates,
    };
    info!(
        rows_read,
        rows_dropped,
        rows_written,
        null_order_dates,
        "Stage complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::record::{Column, ColumnType, Value};
    use crate::sink::{DestinationColumn, DestinationTable, MemoryConnector};
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal::Decimal;

    fn silver_orders() -> TableIdent {
        TableIdent::new(vec!["sales".into()], "silver_orders")
    }

    fn ts(s: &str) -> Value {
        Value::Timestamp(NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").unwrap())
    }

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn amount(v: i64) -> Value {
        Value::Decimal(Decimal::from(v))
    }

    fn catalog(rows: Vec<Vec<Value>>) -> MemoryCatalog {
        MemoryCatalog::new().with_table(
            silver_orders(),
            vec![
                Column::new("amount", ColumnType::Decimal),
                Column::new("order_ts", ColumnType::Timestamp),
            ],
            rows,
        )
    }

    fn connector() -> MemoryConnector {
        MemoryConnector::new(DestinationTable::parse("public.gold_orders").unwrap())
    }

    fn stage_config() -> StageConfig {
        StageConfig {
            catalog_name: Some("local".into()),
            ..StageConfig::new("local.sales.silver_orders")
        }
    }

    #[tokio::test]
    async fn test_drops_non_positive_and_derives_date() {
        let catalog = catalog(vec![
            vec![amount(10), ts("2024-01-05T14:00")],
            vec![amount(-3), ts("2024-01-06T09:00")],
        ]);
        let connector = connector();

        let report = run_stage(&stage_config(), &catalog, &connector)
            .await
            .unwrap();

        assert_eq!(
            report,
            StageReport {
                rows_read: 2,
                rows_dropped: 1,
                rows_written: 1,
                null_order_dates: 0,
            }
        );
        assert_eq!(
            connector.rows().await,
            vec![vec![amount(10), ts("2024-01-05T14:00"), date(2024, 1, 5)]]
        );
    }

    #[tokio::test]
    async fn test_null_timestamp_yields_null_date() {
        let catalog = catalog(vec![vec![amount(5), Value::Null]]);
        let connector = connector();

        let report = run_stage(&stage_config(), &catalog, &connector)
            .await
            .unwrap();

        assert_eq!(report.rows_written, 1);
        assert_eq!(report.null_order_dates, 1);
        assert_eq!(
            connector.rows().await,
            vec![vec![amount(5), Value::Null, Value::Null]]
        );
    }

    #[tokio::test]
    async fn test_unreachable_destination_writes_nothing() {
        let catalog = catalog(vec![vec![amount(10), ts("2024-01-05T14:00")]]);
        let connector = connector().refusing_connections();

        let err = run_stage(&stage_config(), &catalog, &connector)
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::Sink(SinkError::Connection { .. })));
        assert_eq!(err.exit_code(), 5);
        assert_eq!(catalog.rows_read(), 0);
        assert!(connector.rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_table_reads_nothing() {
        let catalog = catalog(vec![vec![amount(10), ts("2024-01-05T14:00")]]);
        let connector = connector();
        let config = StageConfig::new("sales.bronze_orders");

        let err = run_stage(&config, &catalog, &connector).await.unwrap_err();

        assert!(matches!(
            err,
            StageError::Lookup(CatalogError::TableNotFound(_))
        ));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(catalog.rows_read(), 0);
        assert_eq!(connector.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_invalid_identifier_is_lookup_failure() {
        let catalog = catalog(vec![]);
        let err = run_stage(&StageConfig::new("sales..orders"), &catalog, &connector())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_rerun_duplicates_rows() {
        let catalog = catalog(vec![
            vec![amount(10), ts("2024-01-05T14:00")],
            vec![amount(7), ts("2024-01-07T23:59")],
            vec![amount(0), ts("2024-01-08T00:00")],
        ]);
        let connector = connector();

        run_stage(&stage_config(), &catalog, &connector)
            .await
            .unwrap();
        let first = connector.rows().await;
        run_stage(&stage_config(), &catalog, &connector)
            .await
            .unwrap();
        let second = connector.rows().await;

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 4);
        assert_eq!(&second[..2], &first[..]);
        assert_eq!(&second[2..], &first[..]);
    }

    #[tokio::test]
    async fn test_schema_mismatch_before_read() {
        let catalog = catalog(vec![vec![amount(10), ts("2024-01-05T14:00")]]);
        let connector = connector().with_existing_columns(vec![
            DestinationColumn {
                name: "amount".into(),
                data_type: "decimal".into(),
                nullable: true,
                has_default: false,
            },
            DestinationColumn {
                name: "order_ts".into(),
                data_type: "timestamp".into(),
                nullable: true,
                has_default: false,
            },
        ]);

        let err = run_stage(&stage_config(), &catalog, &connector)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StageError::Sink(SinkError::SchemaMismatch { .. })
        ));
        assert_eq!(err.exit_code(), 6);
        assert_eq!(catalog.rows_read(), 0);
        assert!(connector.rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_exit_code() {
        let catalog = catalog(vec![vec![amount(10), ts("2024-01-05T14:00")]]);
        let connector = connector().failing_writes();

        let err = run_stage(&stage_config(), &catalog, &connector)
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::Sink(SinkError::Write { .. })));
        assert_eq!(err.exit_code(), 7);
        assert!(connector.rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_custom_column_names() {
        let catalog = MemoryCatalog::new().with_table(
            silver_orders(),
            vec![
                Column::new("total", ColumnType::Int),
                Column::new("placed_at", ColumnType::Timestamp),
            ],
            vec![vec![Value::Int(4), ts("2024-02-29T08:15")]],
        );
        let connector = connector();
        let config = StageConfig {
            columns: TransformColumns {
                amount: "total".into(),
                order_ts: "placed_at".into(),
                order_date: "placed_on".into(),
            },
            ..StageConfig::new("sales.silver_orders")
        };

        run_stage(&config, &catalog, &connector).await.unwrap();

        assert_eq!(
            connector.column_names().await.unwrap(),
            ["total", "placed_at", "placed_on"]
        );
        assert_eq!(connector.rows().await[0][2], date(2024, 2, 29));
    }
}
