//! Secondary report: variance rows summed by one `group_by` value.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::error::{checked_add, ReconError};
use crate::model::{RollupRow, VarianceRow};

/// Sum each row's final difference under its `field` value, largest total
/// first. Equal totals keep key order. Rows without the field roll up
/// under the empty key.
pub fn rollup(rows: &[VarianceRow], field: &str) -> Result<Vec<RollupRow>, ReconError> {
    let context = format!("rolling up by '{field}'");
    let mut totals: BTreeMap<&str, (usize, Decimal)> = BTreeMap::new();

    for r in rows {
        let key = r.extra.get(field).map(String::as_str).unwrap_or("");
        let entry = totals.entry(key).or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 = checked_add(entry.1, r.final_difference(), &context)?;
    }

    let mut out: Vec<RollupRow> = totals
        .into_iter()
        .map(|(key, (groups, total_difference))| RollupRow {
            key: key.to_string(),
            groups,
            total_difference,
        })
        .collect();
    out.sort_by(|a, b| b.total_difference.cmp(&a.total_difference));
    Ok(out)
}
