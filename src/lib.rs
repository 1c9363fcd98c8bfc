//! gold-etl - silver-to-gold batch stage
//!
//! Reads an order table from an Iceberg warehouse catalog, keeps orders with a
//! strictly positive amount, derives the calendar day of each order timestamp
//! and appends the result to a relational staging table.

pub mod catalog;
pub mod config;
pub mod record;
pub mod sink;
pub mod stage;
pub mod transform;
pub mod utils;

pub use stage::{run_stage, StageConfig, StageError, StageReport};
