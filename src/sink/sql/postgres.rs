//! PostgreSQL database backend.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sea_query::PostgresQueryBuilder;
use sea_query_binder::{SqlxBinder, SqlxValues};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use tracing::info;

use super::{SqlConnector, SqlDatabase, SqlSink};
use crate::record::ColumnType;
use crate::sink::{DestinationColumn, Result, Sink, SinkConnector};

/// Columns of a table, in declaration order.
///
/// Casts avoid decoding the `information_schema` domain types.
const DESCRIBE_TABLE: &str = r#"
SELECT column_name::text AS column_name,
       data_type::text AS data_type,
       (is_nullable = 'YES') AS nullable,
       (column_default IS NOT NULL OR is_identity = 'YES' OR is_generated = 'ALWAYS') AS has_default
FROM information_schema.columns
WHERE table_schema::text = COALESCE($1::text, current_schema()::text)
  AND table_name::text = $2::text
ORDER BY ordinal_position
"#;

/// PostgreSQL database marker type.
pub struct Postgres;

impl SqlDatabase for Postgres {
    type Pool = PgPool;

    const MAX_BIND_PARAMS: usize = 65_535;

    fn build_insert(stmt: sea_query::InsertStatement) -> (String, SqlxValues) {
        stmt.build_sqlx(PostgresQueryBuilder)
    }

    fn build_create(stmt: sea_query::TableCreateStatement) -> String {
        stmt.to_string(PostgresQueryBuilder)
    }

    fn type_compatible(column_type: ColumnType, declared: &str) -> bool {
        let declared = declared.to_ascii_lowercase();
        let accepted: &[&str] = match column_type {
            ColumnType::Boolean => &["boolean"],
            ColumnType::Int => &[
                "smallint",
                "integer",
                "bigint",
                "numeric",
                "real",
                "double precision",
            ],
            ColumnType::Float | ColumnType::Decimal => &["numeric", "real", "double precision"],
            ColumnType::Text => &["text", "character varying", "character"],
            ColumnType::Date => &[
                "date",
                "timestamp without time zone",
                "timestamp with time zone",
            ],
            ColumnType::Timestamp => &["timestamp without time zone", "timestamp with time zone"],
        };
        accepted.contains(&declared.as_str())
    }
}

/// PostgreSQL sink.
pub type PostgresSink = SqlSink<Postgres>;

/// PostgreSQL connector.
pub type PostgresConnector = SqlConnector<Postgres>;

impl SqlSink<Postgres> {
    pub(super) async fn describe(&self) -> Result<Option<Vec<DestinationColumn>>> {
        let rows = sqlx::query(DESCRIBE_TABLE)
            .bind(self.table.schema.as_deref())
            .bind(&self.table.name)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let columns = rows
            .iter()
            .map(|row| {
                Ok(DestinationColumn {
                    name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    nullable: row.try_get("nullable")?,
                    has_default: row.try_get("has_default")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        Ok(Some(columns))
    }
}

#[async_trait]
impl SinkConnector for SqlConnector<Postgres> {
    fn target(&self) -> String {
        self.config.target()
    }

    async fn connect(&self) -> Result<Box<dyn Sink>> {
        let config = &self.config;
        let options = match &config.url {
            Some(url) => PgConnectOptions::from_str(url).map_err(|e| self.connection_error(e))?,
            None => PgConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .database(&config.database)
                .username(&config.user)
                .password(&config.password),
        };

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| self.connection_error(e))?;

        info!(destination = %config.target(), "Connected to PostgreSQL");
        Ok(Box::new(self.sink(pool)))
    }
}
