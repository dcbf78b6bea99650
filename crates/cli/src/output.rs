//! CSV renderings of the variance, rollup and adjusted-detail reports.
//!
//! Amounts are rounded to 2 dp for display only; the JSON report keeps the
//! exact values.

use std::collections::BTreeSet;
use std::path::Path;

use rust_decimal::Decimal;
use royalty_recon::model::{AdjustmentDetail, ReconReport, RollupRow};

pub const VARIANCE_FILE: &str = "variance_report.csv";
pub const ADJUSTED_FILE: &str = "adjusted_detail.csv";
pub const ROLLUP_FILE: &str = "rollup_report.csv";

/// 2 dp, half away from zero, always two fraction digits.
pub fn money(d: Decimal) -> String {
    let rounded = d.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.2}")
}

fn opt_money(d: Option<Decimal>) -> String {
    d.map(money).unwrap_or_default()
}

/// Fractions keep 4 dp.
fn opt_ratio(d: Option<Decimal>) -> String {
    d.map(|d| {
        let rounded = d.round_dp_with_strategy(4, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
        format!("{rounded:.4}")
    })
    .unwrap_or_default()
}

fn opt_bool(b: Option<bool>) -> String {
    b.map(|b| b.to_string()).unwrap_or_default()
}

pub fn write_variance_csv(path: &Path, report: &ReconReport) -> Result<(), csv::Error> {
    let extra: BTreeSet<&str> = report
        .rows
        .iter()
        .flat_map(|r| r.extra.keys().map(String::as_str))
        .collect();

    let mut w = csv::Writer::from_path(path)?;

    let mut header: Vec<&str> = vec![
        "status",
        "match_score",
        "external_entity",
        "internal_entity",
        "line_id",
        "currency",
        "internal_currency",
    ];
    header.extend(extra.iter().copied());
    header.extend([
        "quantity",
        "external_total",
        "converted_total",
        "internal_total",
        "difference",
        "percentage_difference",
        "currency_match",
        "adjusted_total",
        "adjusted_difference",
        "adjusted_percentage_difference",
        "missing_discount",
        "internal_fee",
        "fee_adjusted_difference",
    ]);
    w.write_record(&header)?;

    for r in &report.rows {
        let mut record = vec![
            r.status.to_string(),
            r.match_score.to_string(),
            r.external_entity.clone(),
            r.internal_entity.clone().unwrap_or_default(),
            r.line_id.clone().unwrap_or_default(),
            r.currency.clone(),
            r.internal_currency.clone().unwrap_or_default(),
        ];
        record.extend(extra.iter().map(|k| r.extra.get(*k).cloned().unwrap_or_default()));
        record.extend([
            r.quantity.map(|q| q.normalize().to_string()).unwrap_or_default(),
            money(r.external_total),
            opt_money(r.converted_total),
            opt_money(r.internal_total),
            money(r.difference),
            opt_money(r.percentage_difference),
            opt_bool(r.currency_match),
            opt_money(r.adjusted_total),
            money(r.adjusted_difference),
            opt_money(r.adjusted_percentage_difference),
            opt_ratio(r.missing_discount),
            opt_money(r.internal_fee),
            opt_money(r.fee_adjusted_difference),
        ]);
        w.write_record(&record)?;
    }

    w.flush()?;
    Ok(())
}

/// One line per rollup key, largest total first, headed by the key field.
pub fn write_rollup_csv(path: &Path, key_field: &str, rollup: &[RollupRow]) -> Result<(), csv::Error> {
    let mut w = csv::Writer::from_path(path)?;
    w.write_record([key_field, "groups", "total_difference"])?;
    for r in rollup {
        w.write_record([r.key.clone(), r.groups.to_string(), money(r.total_difference)])?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_adjusted_csv(path: &Path, adjustments: &[AdjustmentDetail]) -> Result<(), csv::Error> {
    let mut w = csv::Writer::from_path(path)?;
    w.write_record([
        "rule", "row", "entity", "currency", "line_id", "promotion", "status", "before", "after",
        "adjusted", "reason",
    ])?;
    for a in adjustments {
        w.write_record([
            a.rule.clone(),
            a.row.to_string(),
            a.entity.clone(),
            a.currency.clone(),
            a.line_id.clone(),
            a.promotion.clone().unwrap_or_default(),
            a.status.clone(),
            opt_money(a.before),
            opt_money(a.after),
            a.adjusted.to_string(),
            a.reason.clone(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn money_formatting() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        assert_eq!(money(d("10")), "10.00");
        assert_eq!(money(d("11.111111")), "11.11");
        assert_eq!(money(d("2.005")), "2.01");
        assert_eq!(money(d("-3.5")), "-3.50");
        assert_eq!(opt_money(None), "");
        assert_eq!(opt_ratio(Some(d("0.021739130"))), "0.0217");
        assert_eq!(opt_ratio(Some(Decimal::ZERO)), "0.0000");
    }

    #[test]
    fn rollup_csv_is_headed_by_key_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ROLLUP_FILE);
        let rows = vec![
            RollupRow { key: "Worms Rumble".into(), groups: 1, total_difference: Decimal::new(15, 2) },
            RollupRow { key: "Sonic Frontiers".into(), groups: 2, total_difference: Decimal::new(-4, 1) },
        ];
        write_rollup_csv(&path, "Product Title", &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Product Title,groups,total_difference\nWorms Rumble,1,0.15\nSonic Frontiers,2,-0.40\n"
        );
    }
}
