//! Destination table compatibility.
//!
//! Policy for an existing destination table:
//! - every output column must exist (exact name first, then
//!   case-insensitive) with a compatible declared type, and no two output
//!   columns may share one destination column;
//! - every destination column that is `NOT NULL` without a default must be
//!   fed by an output column;
//! - other extra destination columns are left to their defaults.

use tracing::warn;

use super::{DestinationTable, Result, SinkError};
use crate::record::{ColumnType, OutputSchema};

/// A column as declared in the destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationColumn {
    pub name: String,
    /// Declared type as reported by the database.
    pub data_type: String,
    pub nullable: bool,
    pub has_default: bool,
}

/// Output shape paired with the destination column names it maps to.
#[derive(Debug, Clone)]
pub struct WritePlan {
    output: OutputSchema,
    target_columns: Vec<String>,
}

impl WritePlan {
    pub fn new(output: OutputSchema, target_columns: Vec<String>) -> Self {
        Self {
            output,
            target_columns,
        }
    }

    /// Plan for a table created from the output shape itself.
    pub fn for_created_table(output: OutputSchema) -> Self {
        let target_columns = output.columns().iter().map(|c| c.name.clone()).collect();
        Self::new(output, target_columns)
    }

    pub fn output(&self) -> &OutputSchema {
        &self.output
    }

    /// Destination column names, in output column order.
    pub fn target_columns(&self) -> &[String] {
        &self.target_columns
    }
}

/// Map output columns onto an existing destination table.
///
/// `compatible(output_type, declared_type)` decides type compatibility for
/// the backend.
pub fn plan_columns<F>(
    table: &DestinationTable,
    output: &OutputSchema,
    existing: &[DestinationColumn],
    compatible: F,
) -> Result<Vec<String>>
where
    F: Fn(ColumnType, &str) -> bool,
{
    let mismatch = |reason: String| SinkError::SchemaMismatch {
        table: table.to_string(),
        reason,
    };

    let mut targets: Vec<String> = Vec::with_capacity(output.columns().len());
    for column in output.columns() {
        let dest = existing
            .iter()
            .find(|d| d.name == column.name)
            .or_else(|| {
                existing
                    .iter()
                    .find(|d| d.name.eq_ignore_ascii_case(&column.name))
            })
            .ok_or_else(|| mismatch(format!("missing column '{}'", column.name)))?;

        if targets.contains(&dest.name) {
            return Err(mismatch(format!(
                "output columns differing only by case both map to '{}'",
                dest.name
            )));
        }

        if !compatible(column.column_type, &dest.data_type) {
            return Err(mismatch(format!(
                "column '{}' holds {} values but is declared '{}'",
                dest.name, column.column_type, dest.data_type
            )));
        }

        if column.nullable && !dest.nullable {
            warn!(
                table = %table,
                column = %dest.name,
                "Nullable output column feeds a NOT NULL destination column"
            );
        }

        targets.push(dest.name.clone());
    }

    if let Some(uncovered) = existing
        .iter()
        .find(|d| !d.nullable && !d.has_default && !targets.contains(&d.name))
    {
        return Err(mismatch(format!(
            "column '{}' is NOT NULL without a default and receives no value",
            uncovered.name
        )));
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::record::test_support::orders_schema;
    use crate::record::{Column, SourceSchema, TransformColumns};

    fn table() -> DestinationTable {
        DestinationTable::parse("public.gold_orders").unwrap()
    }

    fn dest(name: &str, data_type: &str) -> DestinationColumn {
        DestinationColumn {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            has_default: false,
        }
    }

    fn same_name(column_type: ColumnType, declared: &str) -> bool {
        column_type.to_string() == declared
    }

    fn output() -> OutputSchema {
        OutputSchema::new(orders_schema(), "order_date")
    }

    fn matching() -> Vec<DestinationColumn> {
        vec![
            dest("id", "int"),
            dest("amount", "decimal"),
            dest("order_ts", "timestamp"),
            dest("order_date", "date"),
        ]
    }

    #[test]
    fn test_exact_match() {
        let targets = plan_columns(&table(), &output(), &matching(), same_name).unwrap();
        assert_eq!(targets, ["id", "amount", "order_ts", "order_date"]);
    }

    #[test]
    fn test_case_insensitive_match_uses_destination_name() {
        let mut existing = matching();
        existing[1].name = "AMOUNT".into();
        let targets = plan_columns(&table(), &output(), &existing, same_name).unwrap();
        assert_eq!(targets[1], "AMOUNT");
    }

    #[test]
    fn test_missing_column() {
        let mut existing = matching();
        existing.retain(|c| c.name != "order_date");
        let err = plan_columns(&table(), &output(), &existing, same_name).unwrap_err();
        match err {
            SinkError::SchemaMismatch { table, reason } => {
                assert_eq!(table, "public.gold_orders");
                assert!(reason.contains("order_date"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_incompatible_type() {
        let mut existing = matching();
        existing[3].data_type = "boolean".into();
        assert!(matches!(
            plan_columns(&table(), &output(), &existing, same_name),
            Err(SinkError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_extra_required_column_without_default() {
        let mut existing = matching();
        existing.push(DestinationColumn {
            nullable: false,
            ..dest("region", "text")
        });
        assert!(matches!(
            plan_columns(&table(), &output(), &existing, same_name),
            Err(SinkError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_extra_defaulted_column_allowed() {
        let mut existing = matching();
        existing.push(DestinationColumn {
            nullable: false,
            has_default: true,
            ..dest("loaded_at", "timestamp")
        });
        existing.push(dest("note", "text"));
        let targets = plan_columns(&table(), &output(), &existing, same_name).unwrap();
        assert_eq!(targets.len(), 4);
    }

    #[test]
    fn test_case_variants_cannot_share_a_column() {
        let schema = SourceSchema::resolve(
            vec![
                Column::new("Amount", ColumnType::Decimal),
                Column::new("amount", ColumnType::Decimal),
                Column::new("order_ts", ColumnType::Timestamp),
            ],
            &TransformColumns::default(),
        )
        .unwrap();
        let output = OutputSchema::new(Arc::new(schema), "order_date");
        let existing = vec![
            dest("amount", "decimal"),
            dest("order_ts", "timestamp"),
            dest("order_date", "date"),
        ];

        match plan_columns(&table(), &output, &existing, same_name) {
            Err(SinkError::SchemaMismatch { reason, .. }) => {
                assert!(reason.contains("'amount'"), "reason: {}", reason)
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_write_plan_for_created_table() {
        let plan = WritePlan::for_created_table(output());
        assert_eq!(plan.target_columns(), ["id", "amount", "order_ts", "order_date"]);
    }
}
