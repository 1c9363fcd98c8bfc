//! Parquet data file decoding.
//!
//! Data files are read through Arrow and converted column by column into
//! [`Value`]s in source schema order. Columns are located by Iceberg field
//! id when the file carries `PARQUET:field_id` metadata, so renamed columns
//! still resolve; files written without ids fall back to matching by name.
//! A column absent from an older data file reads as null.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    DataType, Date32Type, Schema, Decimal128Type, Float32Type, Float64Type, Int16Type, Int32Type,
    Int64Type, Int8Type, TimeUnit, TimestampMicrosecondType, TimestampMillisecondType,
    TimestampNanosecondType, TimestampSecondType, UInt16Type, UInt32Type, UInt8Type,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::PARQUET_FIELD_ID_META_KEY;
use rust_decimal::Decimal;
use tracing::debug;

use super::{CatalogError, Result};
use crate::record::{Column, SourceRecord, SourceSchema, Value};

/// Decode every row of a Parquet data file.
pub(crate) fn read_data_file(path: &Path, schema: &Arc<SourceSchema>) -> Result<Vec<SourceRecord>> {
    let file = File::open(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let projection = project(builder.schema(), schema.columns());
    let reader = builder.build()?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch?;
        let arrays: Vec<Option<ArrayRef>> = projection
            .iter()
            .map(|index| index.map(|i| batch.column(i).clone()))
            .collect();

        for row in 0..batch.num_rows() {
            let values = arrays
                .iter()
                .map(|array| match array {
                    Some(array) => value_at(array, row),
                    None => Ok(Value::Null),
                })
                .collect::<Result<Vec<_>>>()?;
            records.push(SourceRecord::new(schema.clone(), values)?);
        }
    }

    debug!(path = %path.display(), rows = records.len(), "Data file decoded");
    Ok(records)
}

/// Position of each source column in a data file's top-level fields.
///
/// A file with field ids is matched by id only, as a name there may belong
/// to a column since renamed or dropped.
pub(crate) fn project(file_schema: &Schema, columns: &[Column]) -> Vec<Option<usize>> {
    let ids: Vec<Option<i32>> = file_schema
        .fields()
        .iter()
        .map(|field| {
            field
                .metadata()
                .get(PARQUET_FIELD_ID_META_KEY)
                .and_then(|id| id.parse().ok())
        })
        .collect();

    if ids.iter().any(Option::is_some) {
        columns
            .iter()
            .map(|column| {
                let id = column.field_id?;
                ids.iter().position(|f| *f == Some(id))
            })
            .collect()
    } else {
        columns
            .iter()
            .map(|column| file_schema.index_of(&column.name).ok())
            .collect()
    }
}

/// Convert one Arrow cell to a [`Value`].
pub(crate) fn value_at(array: &ArrayRef, row: usize) -> Result<Value> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }

    let value = match array.data_type() {
        DataType::Boolean => Value::Boolean(array.as_boolean().value(row)),
        DataType::Int8 => Value::Int(array.as_primitive::<Int8Type>().value(row).into()),
        DataType::Int16 => Value::Int(array.as_primitive::<Int16Type>().value(row).into()),
        DataType::Int32 => Value::Int(array.as_primitive::<Int32Type>().value(row).into()),
        DataType::Int64 => Value::Int(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Value::Int(array.as_primitive::<UInt8Type>().value(row).into()),
        DataType::UInt16 => Value::Int(array.as_primitive::<UInt16Type>().value(row).into()),
        DataType::UInt32 => Value::Int(array.as_primitive::<UInt32Type>().value(row).into()),
        DataType::Float32 => Value::Float(array.as_primitive::<Float32Type>().value(row).into()),
        DataType::Float64 => Value::Float(array.as_primitive::<Float64Type>().value(row)),
        DataType::Decimal128(_, scale) => {
            let raw = array.as_primitive::<Decimal128Type>().value(row);
            Value::Decimal(decimal(raw, *scale)?)
        }
        DataType::Utf8 => Value::Text(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::Text(array.as_string::<i64>().value(row).to_string()),
        DataType::Date32 => {
            let date = array.as_primitive::<Date32Type>().value_as_date(row);
            Value::Date(date.ok_or_else(|| out_of_range(array.data_type()))?)
        }
        DataType::Timestamp(unit, _) => {
            let ts = match unit {
                TimeUnit::Second => array
                    .as_primitive::<TimestampSecondType>()
                    .value_as_datetime(row),
                TimeUnit::Millisecond => array
                    .as_primitive::<TimestampMillisecondType>()
                    .value_as_datetime(row),
                TimeUnit::Microsecond => array
                    .as_primitive::<TimestampMicrosecondType>()
                    .value_as_datetime(row),
                TimeUnit::Nanosecond => array
                    .as_primitive::<TimestampNanosecondType>()
                    .value_as_datetime(row),
            };
            Value::Timestamp(ts.ok_or_else(|| out_of_range(array.data_type()))?)
        }
        other => {
            return Err(CatalogError::Unsupported(format!(
                "Parquet column of Arrow type {}",
                other
            )))
        }
    };

    Ok(value)
}

fn decimal(raw: i128, scale: i8) -> Result<Decimal> {
    let scale = u32::try_from(scale)
        .map_err(|_| CatalogError::Unsupported(format!("negative decimal scale {}", scale)))?;
    Decimal::try_from_i128_with_scale(raw, scale)
        .map_err(|e| CatalogError::Unsupported(format!("decimal value {}e-{}: {}", raw, scale, e)))
}

fn out_of_range(data_type: &DataType) -> CatalogError {
    CatalogError::Unsupported(format!("{} value out of range", data_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{
        BooleanArray, Date32Array, Decimal128Array, Float64Array, Int32Array, StringArray,
        TimestampMicrosecondArray, UInt64Array,
    };
    use arrow::datatypes::Field;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::HashMap;

    use crate::record::ColumnType;

    fn field(name: &str, field_id: Option<i32>) -> Field {
        let field = Field::new(name, DataType::Int64, true);
        match field_id {
            Some(id) => field.with_metadata(HashMap::from([(
                PARQUET_FIELD_ID_META_KEY.to_string(),
                id.to_string(),
            )])),
            None => field,
        }
    }

    fn source_columns() -> Vec<Column> {
        vec![
            Column::new("order_id", ColumnType::Int).with_field_id(1),
            Column::new("amount", ColumnType::Int).with_field_id(2),
            Column::new("order_ts", ColumnType::Int).with_field_id(3),
        ]
    }

    #[test]
    fn test_project_by_field_id_follows_renames() {
        // Written before `total` was renamed to `amount`; `order_ts` added later.
        let file = Schema::new(vec![field("total", Some(2)), field("order_id", Some(1))]);
        assert_eq!(
            project(&file, &source_columns()),
            vec![Some(1), Some(0), None]
        );
    }

    #[test]
    fn test_project_by_field_id_ignores_reused_names() {
        // `amount` in this file is a dropped column, not field 2.
        let file = Schema::new(vec![field("order_id", Some(1)), field("amount", Some(9))]);
        assert_eq!(project(&file, &source_columns()), vec![Some(0), None, None]);
    }

    #[test]
    fn test_project_by_name_without_field_ids() {
        let file = Schema::new(vec![field("order_ts", None), field("amount", None)]);
        assert_eq!(project(&file, &source_columns()), vec![None, Some(1), Some(0)]);
    }

    #[test]
    fn test_value_at_primitives() {
        let ints: ArrayRef = Arc::new(Int32Array::from(vec![Some(7), None]));
        assert_eq!(value_at(&ints, 0).unwrap(), Value::Int(7));
        assert_eq!(value_at(&ints, 1).unwrap(), Value::Null);

        let floats: ArrayRef = Arc::new(Float64Array::from(vec![2.5]));
        assert_eq!(value_at(&floats, 0).unwrap(), Value::Float(2.5));

        let bools: ArrayRef = Arc::new(BooleanArray::from(vec![true]));
        assert_eq!(value_at(&bools, 0).unwrap(), Value::Boolean(true));

        let text: ArrayRef = Arc::new(StringArray::from(vec!["EUR"]));
        assert_eq!(value_at(&text, 0).unwrap(), Value::Text("EUR".into()));
    }

    #[test]
    fn test_value_at_decimal_keeps_scale() {
        let array: ArrayRef = Arc::new(
            Decimal128Array::from(vec![1050_i128])
                .with_precision_and_scale(10, 2)
                .unwrap(),
        );
        assert_eq!(
            value_at(&array, 0).unwrap(),
            Value::Decimal(Decimal::new(1050, 2))
        );
    }

    #[test]
    fn test_value_at_temporal() {
        let dates: ArrayRef = Arc::new(Date32Array::from(vec![19727]));
        assert_eq!(
            value_at(&dates, 0).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
        );

        let expected =
            NaiveDateTime::parse_from_str("2024-01-05 14:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let micros = expected.and_utc().timestamp_micros();
        let timestamps: ArrayRef =
            Arc::new(TimestampMicrosecondArray::from(vec![micros]).with_timezone("UTC"));
        assert_eq!(value_at(&timestamps, 0).unwrap(), Value::Timestamp(expected));
    }

    #[test]
    fn test_value_at_unsupported_type() {
        let array: ArrayRef = Arc::new(UInt64Array::from(vec![1_u64]));
        assert!(matches!(
            value_at(&array, 0),
            Err(CatalogError::Unsupported(_))
        ));
    }

    #[test]
    fn test_decimal_rejects_negative_scale() {
        assert!(decimal(5, -2).is_err());
        assert_eq!(decimal(-125, 1).unwrap(), Decimal::new(-125, 1));
    }
}
