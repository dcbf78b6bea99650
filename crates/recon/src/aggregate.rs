use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::error::{checked_add, ReconError};
use crate::model::{AggregateRow, Record};

/// Group records by the exact text of `group_keys`, summing `sum_fields`.
/// Output is sorted by key tuple.
pub fn aggregate(
    records: &[Record],
    group_keys: &[&str],
    sum_fields: &[&str],
) -> Result<Vec<AggregateRow>, ReconError> {
    aggregate_by(
        records,
        |r| group_keys.iter().map(|k| r.get(k).as_text()).collect(),
        sum_fields,
    )
}

/// Group by a computed key tuple. Nulls and non-numeric values add zero, but
/// every sum field is present on every output row. A sum that leaves the
/// decimal range is an error rather than a wrapped or saturated total.
pub fn aggregate_by<F>(
    records: &[Record],
    key_fn: F,
    sum_fields: &[&str],
) -> Result<Vec<AggregateRow>, ReconError>
where
    F: Fn(&Record) -> Vec<String>,
{
    let mut groups: BTreeMap<Vec<String>, (BTreeMap<String, Decimal>, Vec<usize>)> = BTreeMap::new();

    for (i, record) in records.iter().enumerate() {
        let entry = groups.entry(key_fn(record)).or_insert_with(|| {
            let sums = sum_fields
                .iter()
                .map(|f| (f.to_string(), Decimal::ZERO))
                .collect();
            (sums, Vec::new())
        });
        for field in sum_fields {
            if let Some(v) = record.get(field).as_decimal() {
                if let Some(total) = entry.0.get_mut(*field) {
                    *total = checked_add(*total, v, &format!("summing '{field}'"))?;
                }
            }
        }
        entry.1.push(i);
    }

    Ok(groups
        .into_iter()
        .map(|(key, (sums, record_indices))| AggregateRow {
            key,
            sums,
            record_indices,
        })
        .collect())
}

/// Keep only groups whose summed `quantity_field` is strictly positive.
/// Returns the kept rows and how many were dropped.
pub fn retain_positive(rows: Vec<AggregateRow>, quantity_field: &str) -> (Vec<AggregateRow>, usize) {
    let before = rows.len();
    let kept: Vec<AggregateRow> = rows
        .into_iter()
        .filter(|r| r.sum(quantity_field) > Decimal::ZERO)
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}
