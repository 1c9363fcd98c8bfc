//! Source and transform configuration types.

use serde::Deserialize;

use crate::record::TransformColumns;

/// Warehouse catalog and source table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Catalog name; a leading identifier part equal to it is stripped.
    pub catalog_name: String,
    /// Warehouse root, a local path or `file://` URI.
    pub warehouse: String,
    /// Source table, `[catalog.]namespace.table`.
    pub table: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            catalog_name: "local".to_string(),
            warehouse: "/warehouse/iceberg".to_string(),
            table: "local.silver_orders".to_string(),
        }
    }
}

/// Column names read and written by the transform.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub amount_column: String,
    pub timestamp_column: String,
    /// Derived calendar-day column appended to every output row.
    pub order_date_column: String,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            amount_column: "amount".to_string(),
            timestamp_column: "order_ts".to_string(),
            order_date_column: "order_date".to_string(),
        }
    }
}

impl TransformConfig {
    pub fn columns(&self) -> TransformColumns {
        TransformColumns {
            amount: self.amount_column.clone(),
            order_ts: self.timestamp_column.clone(),
            order_date: self.order_date_column.clone(),
        }
    }
}
