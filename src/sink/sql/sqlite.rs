//! SQLite database backend.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sea_query::SqliteQueryBuilder;
use sea_query_binder::{SqlxBinder, SqlxValues};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::{SqlConnector, SqlDatabase, SqlSink};
use crate::record::ColumnType;
use crate::sink::{DestinationColumn, Result, Sink, SinkConnector};

/// Columns of a table, in declaration order. An INTEGER PRIMARY KEY aliases
/// the rowid and is filled automatically.
const DESCRIBE_TABLE: &str = r#"
SELECT name,
       type AS data_type,
       "notnull" AS not_null,
       (dflt_value IS NOT NULL OR (pk = 1 AND upper(type) = 'INTEGER')) AS has_default
FROM pragma_table_info(?1, ?2)
ORDER BY cid
"#;

/// SQLite database marker type.
pub struct Sqlite;

/// Column type affinity, per SQLite's name-matching rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affinity {
    Integer,
    Text,
    Blob,
    Real,
    Numeric,
}

fn affinity(declared: &str) -> Affinity {
    let declared = declared.to_ascii_uppercase();
    if declared.contains("INT") {
        Affinity::Integer
    } else if ["CHAR", "CLOB", "TEXT"].iter().any(|t| declared.contains(t)) {
        Affinity::Text
    } else if declared.is_empty() || declared.contains("BLOB") {
        Affinity::Blob
    } else if ["REAL", "FLOA", "DOUB"].iter().any(|t| declared.contains(t)) {
        Affinity::Real
    } else {
        Affinity::Numeric
    }
}

impl SqlDatabase for Sqlite {
    type Pool = SqlitePool;

    const MAX_BIND_PARAMS: usize = 32_766;

    fn build_insert(stmt: sea_query::InsertStatement) -> (String, SqlxValues) {
        stmt.build_sqlx(SqliteQueryBuilder)
    }

    fn build_create(stmt: sea_query::TableCreateStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    /// SQLite stores any value in any column; reject only pairings whose
    /// affinity would convert the value into another storage class.
    fn type_compatible(column_type: ColumnType, declared: &str) -> bool {
        match (column_type, affinity(declared)) {
            (_, Affinity::Blob) => true,
            (ColumnType::Text, a) => a == Affinity::Text,
            (ColumnType::Boolean | ColumnType::Int, a) => a != Affinity::Text,
            (ColumnType::Float | ColumnType::Decimal, a) => {
                matches!(a, Affinity::Real | Affinity::Numeric)
            }
            (ColumnType::Date | ColumnType::Timestamp, a) => {
                matches!(a, Affinity::Text | Affinity::Numeric)
            }
        }
    }
}

/// SQLite sink.
pub type SqliteSink = SqlSink<Sqlite>;

/// SQLite connector.
pub type SqliteConnector = SqlConnector<Sqlite>;

impl SqlSink<Sqlite> {
    pub(super) async fn describe(&self) -> Result<Option<Vec<DestinationColumn>>> {
        let rows = sqlx::query(DESCRIBE_TABLE)
            .bind(&self.table.name)
            .bind(self.table.schema.as_deref().unwrap_or("main"))
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let columns = rows
            .iter()
            .map(|row| {
                Ok(DestinationColumn {
                    name: row.try_get("name")?,
                    data_type: row.try_get("data_type")?,
                    nullable: row.try_get::<i64, _>("not_null")? == 0,
                    has_default: row.try_get::<i64, _>("has_default")? != 0,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        Ok(Some(columns))
    }
}

#[async_trait]
impl SinkConnector for SqlConnector<Sqlite> {
    fn target(&self) -> String {
        self.config.target()
    }

    async fn connect(&self) -> Result<Box<dyn Sink>> {
        let config = &self.config;
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| self.connection_error("no database URL configured"))?;

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| self.connection_error(e))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| self.connection_error(e))?;

        info!(destination = %config.target(), "Connected to SQLite");
        Ok(Box::new(self.sink(pool)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affinity() {
        assert_eq!(affinity("BIGINT"), Affinity::Integer);
        assert_eq!(affinity("varchar(20)"), Affinity::Text);
        assert_eq!(affinity("timestamp_text"), Affinity::Text);
        assert_eq!(affinity(""), Affinity::Blob);
        assert_eq!(affinity("double"), Affinity::Real);
        assert_eq!(affinity("date"), Affinity::Numeric);
        assert_eq!(affinity("decimal(10,2)"), Affinity::Numeric);
    }

    #[test]
    fn test_type_compatibility() {
        assert!(Sqlite::type_compatible(ColumnType::Decimal, "real"));
        assert!(Sqlite::type_compatible(ColumnType::Date, "date"));
        assert!(Sqlite::type_compatible(ColumnType::Date, "text"));
        assert!(Sqlite::type_compatible(ColumnType::Int, "integer"));
        assert!(Sqlite::type_compatible(ColumnType::Text, ""));

        assert!(!Sqlite::type_compatible(ColumnType::Int, "text"));
        assert!(!Sqlite::type_compatible(ColumnType::Date, "integer"));
        assert!(!Sqlite::type_compatible(ColumnType::Text, "integer"));
    }
}
