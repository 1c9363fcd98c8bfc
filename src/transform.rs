//! Silver-to-gold row transform.
//!
//! Two pure per-record steps, composed by [`transform`]:
//! drop orders without a strictly positive amount, then attach the
//! calendar date of the order timestamp.

use chrono::NaiveDate;

use crate::record::{DerivedRecord, SourceRecord, Value};

/// Keep only records whose amount is strictly greater than zero.
///
/// Null, zero, negative and NaN amounts are dropped silently.
pub fn filter_positive_amount(records: Vec<SourceRecord>) -> Vec<SourceRecord> {
    records
        .into_iter()
        .filter(|record| record.amount().is_strictly_positive())
        .collect()
}

/// Attach the calendar-day truncation of the order timestamp.
///
/// A null timestamp yields a null date.
pub fn derive_order_date(record: SourceRecord) -> DerivedRecord {
    let order_date = truncate_to_date(record.order_ts());
    DerivedRecord {
        source: record,
        order_date,
    }
}

fn truncate_to_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Timestamp(ts) => Some(ts.date()),
        Value::Date(date) => Some(*date),
        _ => None,
    }
}

/// Filter, then derive.
pub fn transform(records: Vec<SourceRecord>) -> Vec<DerivedRecord> {
    filter_positive_amount(records)
        .into_iter()
        .map(derive_order_date)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::{order, ts};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_filter_drops_non_positive_and_null_amounts() {
        let records = vec![
            order(1, Some(10), ts("2024-01-05T14:00")),
            order(2, Some(0), ts("2024-01-05T14:00")),
            order(3, Some(-3), ts("2024-01-06T09:00")),
            order(4, None, ts("2024-01-06T09:00")),
            order(5, Some(1), Value::Null),
        ];

        let kept: Vec<Value> = filter_positive_amount(records)
            .iter()
            .map(|r| r.values()[0].clone())
            .collect();

        assert_eq!(kept, vec![Value::Int(1), Value::Int(5)]);
    }

    #[test]
    fn test_filter_empty_input() {
        assert!(filter_positive_amount(Vec::new()).is_empty());
    }

    #[test]
    fn test_derive_truncates_to_day() {
        let derived = derive_order_date(order(1, Some(10), ts("2024-01-05T23:59")));
        assert_eq!(derived.order_date, Some(date(2024, 1, 5)));

        let derived = derive_order_date(order(1, Some(10), ts("2024-01-06T00:00")));
        assert_eq!(derived.order_date, Some(date(2024, 1, 6)));
    }

    #[test]
    fn test_derive_propagates_null_timestamp() {
        let derived = derive_order_date(order(1, Some(5), Value::Null));
        assert_eq!(derived.order_date, None);
    }

    #[test]
    fn test_truncate_date_is_identity() {
        assert_eq!(
            truncate_to_date(&Value::Date(date(2023, 12, 31))),
            Some(date(2023, 12, 31))
        );
    }

    #[test]
    fn test_transform_one_positive_order_survives() {
        let records = vec![
            order(1, Some(10), ts("2024-01-05T14:00")),
            order(2, Some(-3), ts("2024-01-06T09:00")),
        ];

        let out = transform(records);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source.values()[0], Value::Int(1));
        assert_eq!(out[0].order_date, Some(date(2024, 1, 5)));
    }

    #[test]
    fn test_transform_positive_amount_with_null_timestamp() {
        let out = transform(vec![order(1, Some(5), Value::Null)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].order_date, None);
    }

    #[test]
    fn test_transform_invariant_holds() {
        let records: Vec<SourceRecord> = (-5..=5)
            .map(|amount| {
                let ts_value = if amount % 2 == 0 {
                    Value::Null
                } else {
                    ts("2024-02-29T12:30")
                };
                order(amount, Some(amount), ts_value)
            })
            .collect();

        for record in transform(records) {
            assert!(record.source.amount().is_strictly_positive());
            assert_eq!(record.order_date.is_some(), !record.source.order_ts().is_null());
        }
    }
}
