//! Row model shared by the catalog, the transform and the sink.
//!
//! Rows are positional: a [`SourceRecord`] holds one [`Value`] per column of
//! its [`SourceSchema`], which it shares by `Arc`.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    /// Timestamps carrying a zone are normalised to UTC before landing here.
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True only for numeric values strictly greater than zero.
    ///
    /// Null, non-numeric and NaN values are never positive.
    pub fn is_strictly_positive(&self) -> bool {
        match self {
            Value::Int(v) => *v > 0,
            Value::Float(v) => *v > 0.0,
            Value::Decimal(v) => *v > Decimal::ZERO,
            _ => false,
        }
    }
}

/// Logical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Int,
    Float,
    Decimal,
    Text,
    Date,
    Timestamp,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float | ColumnType::Decimal)
    }

    /// Whether a value can be stored in a column of this type.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ColumnType::Boolean, Value::Boolean(_))
                | (ColumnType::Int, Value::Int(_))
                | (ColumnType::Float, Value::Float(_))
                | (ColumnType::Decimal, Value::Decimal(_))
                | (ColumnType::Text, Value::Text(_))
                | (ColumnType::Date, Value::Date(_))
                | (ColumnType::Timestamp, Value::Timestamp(_))
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Decimal => "decimal",
            ColumnType::Text => "text",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    /// Iceberg field id, stable across renames.
    pub field_id: Option<i32>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            field_id: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_field_id(mut self, field_id: i32) -> Self {
        self.field_id = Some(field_id);
        self
    }
}

/// Names of the columns the transform reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformColumns {
    pub amount: String,
    pub order_ts: String,
    pub order_date: String,
}

impl Default for TransformColumns {
    fn default() -> Self {
        Self {
            amount: "amount".to_string(),
            order_ts: "order_ts".to_string(),
            order_date: "order_date".to_string(),
        }
    }
}

/// Errors resolving the transform columns against a table schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Column '{0}' not found in source schema")]
    MissingColumn(String),

    #[error("Column '{column}' has type {actual}, expected {expected}")]
    IncompatibleType {
        column: String,
        actual: ColumnType,
        expected: &'static str,
    },

    #[error("Duplicate column '{0}' in source schema")]
    DuplicateColumn(String),
}

/// Source table columns with the amount and order-timestamp positions resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSchema {
    columns: Vec<Column>,
    amount_index: usize,
    order_ts_index: usize,
}

impl SourceSchema {
    /// Resolve the transform columns against the given table columns.
    pub fn resolve(
        columns: Vec<Column>,
        names: &TransformColumns,
    ) -> Result<Self, SchemaError> {
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
        }

        let position = |name: &str| {
            columns
                .iter()
                .position(|c| c.name == name)
                .ok_or_else(|| SchemaError::MissingColumn(name.to_string()))
        };

        let amount_index = position(&names.amount)?;
        let amount_type = columns[amount_index].column_type;
        if !amount_type.is_numeric() {
            return Err(SchemaError::IncompatibleType {
                column: names.amount.clone(),
                actual: amount_type,
                expected: "a numeric type",
            });
        }

        let order_ts_index = position(&names.order_ts)?;
        let ts_type = columns[order_ts_index].column_type;
        if !matches!(ts_type, ColumnType::Timestamp | ColumnType::Date) {
            return Err(SchemaError::IncompatibleType {
                column: names.order_ts.clone(),
                actual: ts_type,
                expected: "timestamp or date",
            });
        }

        Ok(Self {
            columns,
            amount_index,
            order_ts_index,
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn amount_column(&self) -> &Column {
        &self.columns[self.amount_index]
    }

    pub fn order_ts_column(&self) -> &Column {
        &self.columns[self.order_ts_index]
    }
}

/// One source row. Read-only; owned by the upstream table.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    schema: Arc<SourceSchema>,
    values: Vec<Value>,
}

impl SourceRecord {
    /// Build a record, checking arity and value types against the schema.
    pub fn new(schema: Arc<SourceSchema>, values: Vec<Value>) -> Result<Self, RecordError> {
        if values.len() != schema.columns.len() {
            return Err(RecordError::Arity {
                expected: schema.columns.len(),
                actual: values.len(),
            });
        }
        for (column, value) in schema.columns.iter().zip(&values) {
            if !column.column_type.accepts(value) {
                return Err(RecordError::TypeMismatch {
                    column: column.name.clone(),
                    expected: column.column_type,
                });
            }
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &Arc<SourceSchema> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn amount(&self) -> &Value {
        &self.values[self.schema.amount_index]
    }

    pub fn order_ts(&self) -> &Value {
        &self.values[self.schema.order_ts_index]
    }
}

/// Errors building a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("Record has {actual} values, schema has {expected} columns")]
    Arity { expected: usize, actual: usize },

    #[error("Value for column '{column}' is not a {expected}")]
    TypeMismatch { column: String, expected: ColumnType },
}

/// A source row plus its derived calendar date.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRecord {
    pub source: SourceRecord,
    pub order_date: Option<NaiveDate>,
}

/// Shape of the rows written downstream.
///
/// Source columns keep their order; the derived date column comes last. A
/// source column already named like the derived column is replaced by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    source: Arc<SourceSchema>,
    passthrough: Vec<usize>,
    columns: Vec<Column>,
}

impl OutputSchema {
    pub fn new(source: Arc<SourceSchema>, order_date_column: &str) -> Self {
        let passthrough: Vec<usize> = source
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.name != order_date_column)
            .map(|(i, _)| i)
            .collect();

        let mut columns: Vec<Column> = passthrough
            .iter()
            .map(|&i| source.columns[i].clone())
            .collect();
        columns.push(Column::new(order_date_column, ColumnType::Date));

        Self {
            source,
            passthrough,
            columns,
        }
    }

    pub fn source(&self) -> &Arc<SourceSchema> {
        &self.source
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Values of a derived record in output column order.
    pub fn row(&self, record: &DerivedRecord) -> Vec<Value> {
        let mut row: Vec<Value> = self
            .passthrough
            .iter()
            .map(|&i| record.source.values[i].clone())
            .collect();
        row.push(record.order_date.map_or(Value::Null, Value::Date));
        row
    }
}

/// Rows scanned from a source table.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub schema: Arc<SourceSchema>,
    pub records: Vec<SourceRecord>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Orders schema: id, amount (decimal), order_ts (timestamp).
    pub fn orders_schema() -> Arc<SourceSchema> {
        Arc::new(
            SourceSchema::resolve(
                vec![
                    Column::new("id", ColumnType::Int).required(),
                    Column::new("amount", ColumnType::Decimal),
                    Column::new("order_ts", ColumnType::Timestamp),
                ],
                &TransformColumns::default(),
            )
            .unwrap(),
        )
    }

    pub fn ts(s: &str) -> Value {
        Value::Timestamp(NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").unwrap())
    }

    pub fn order(id: i64, amount: Option<i64>, order_ts: Value) -> SourceRecord {
        SourceRecord::new(
            orders_schema(),
            vec![
                Value::Int(id),
                amount.map_or(Value::Null, |a| Value::Decimal(Decimal::from(a))),
                order_ts,
            ],
        )
        .unwrap()
    }
}
