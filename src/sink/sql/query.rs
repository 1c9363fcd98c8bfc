//! SQL database abstraction trait and statement builders.

use sea_query::{
    Alias, ColumnDef, InsertStatement, IntoTableRef, Query, SimpleExpr, Table,
    TableCreateStatement, TableRef,
};
use sea_query_binder::SqlxValues;

use crate::record::{ColumnType, DerivedRecord, OutputSchema, Value};
use crate::sink::{DestinationTable, WritePlan};

/// Trait for SQL database backends.
///
/// This trait abstracts over different SQL databases (PostgreSQL, SQLite)
/// by providing the pool type, query building and type compatibility rules.
pub trait SqlDatabase: Send + Sync + 'static {
    /// The connection pool type for this database.
    type Pool: Clone + Send + Sync;

    /// Bind parameters one statement may carry.
    const MAX_BIND_PARAMS: usize;

    /// Build a SQL query string and its bound values from a sea-query
    /// INSERT statement.
    fn build_insert(stmt: InsertStatement) -> (String, SqlxValues);

    /// Build a SQL query string from a sea-query CREATE TABLE statement.
    fn build_create(stmt: TableCreateStatement) -> String;

    /// Whether values of `column_type` can be stored in a column declared as
    /// `declared` (as reported by the database catalog).
    fn type_compatible(column_type: ColumnType, declared: &str) -> bool;
}

pub(crate) fn table_ref(table: &DestinationTable) -> TableRef {
    match &table.schema {
        Some(schema) => (Alias::new(schema), Alias::new(&table.name)).into_table_ref(),
        None => Alias::new(&table.name).into_table_ref(),
    }
}

/// CREATE TABLE for the output shape.
pub(crate) fn create_table(table: &DestinationTable, output: &OutputSchema) -> TableCreateStatement {
    let mut stmt = Table::create();
    stmt.table(table_ref(table)).if_not_exists();

    for column in output.columns() {
        let mut def = ColumnDef::new(Alias::new(&column.name));
        match column.column_type {
            ColumnType::Boolean => def.boolean(),
            ColumnType::Int => def.big_integer(),
            ColumnType::Float => def.double(),
            ColumnType::Decimal => def.decimal(),
            ColumnType::Text => def.text(),
            ColumnType::Date => def.date(),
            ColumnType::Timestamp => def.timestamp(),
        };
        if column.nullable {
            def.null();
        } else {
            def.not_null();
        }
        stmt.col(&mut def);
    }

    stmt.to_owned()
}

/// Rows per INSERT: `batch_size`, lowered so one statement stays within the
/// backend's bind parameter limit.
pub(crate) fn rows_per_statement<DB: SqlDatabase>(batch_size: usize, columns: usize) -> usize {
    batch_size
        .min(DB::MAX_BIND_PARAMS / columns.max(1))
        .max(1)
}

/// Multi-row INSERT statements of at most `batch_size` rows each.
pub(crate) fn insert_statements(
    table: &DestinationTable,
    plan: &WritePlan,
    records: &[DerivedRecord],
    batch_size: usize,
) -> Result<Vec<InsertStatement>, sea_query::error::Error> {
    let output = plan.output();
    let columns: Vec<Alias> = plan.target_columns().iter().map(Alias::new).collect();

    let mut statements = Vec::with_capacity(records.len().div_ceil(batch_size.max(1)));
    for chunk in records.chunks(batch_size.max(1)) {
        let mut stmt = Query::insert();
        stmt.into_table(table_ref(table)).columns(columns.clone());

        for record in chunk {
            let row = output.row(record);
            stmt.values(
                row.iter()
                    .zip(output.columns())
                    .map(|(value, column)| SimpleExpr::Value(sql_value(value, column.column_type))),
            )?;
        }

        statements.push(stmt.to_owned());
    }

    Ok(statements)
}

/// Convert a cell to a sea-query value. Nulls are typed by their column.
fn sql_value(value: &Value, column_type: ColumnType) -> sea_query::Value {
    match value {
        Value::Null => typed_null(column_type),
        Value::Boolean(v) => (*v).into(),
        Value::Int(v) => (*v).into(),
        Value::Float(v) => (*v).into(),
        Value::Decimal(v) => (*v).into(),
        Value::Text(v) => v.as_str().into(),
        Value::Date(v) => (*v).into(),
        Value::Timestamp(v) => (*v).into(),
    }
}

fn typed_null(column_type: ColumnType) -> sea_query::Value {
    match column_type {
        ColumnType::Boolean => Option::<bool>::None.into(),
        ColumnType::Int => Option::<i64>::None.into(),
        ColumnType::Float => Option::<f64>::None.into(),
        ColumnType::Decimal => Option::<rust_decimal::Decimal>::None.into(),
        ColumnType::Text => Option::<String>::None.into(),
        ColumnType::Date => Option::<chrono::NaiveDate>::None.into(),
        ColumnType::Timestamp => Option::<chrono::NaiveDateTime>::None.into(),
    }
}
