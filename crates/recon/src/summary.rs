use rust_decimal::Decimal;

use crate::error::{checked_add, ReconError};
use crate::model::{MatchStatus, ReconSummary, VarianceRow};

/// Compute summary statistics from variance rows.
///
/// Totals are column sums of the report: the external side in comparison
/// currency, the internal side over matched rows only. An internal group
/// chosen by several external groups is counted once per row.
pub fn compute_summary(rows: &[VarianceRow], adjusted_lines: usize) -> Result<ReconSummary, ReconError> {
    let mut summary = ReconSummary {
        total_groups: rows.len(),
        adjusted_lines,
        ..ReconSummary::default()
    };

    for r in rows {
        match r.status {
            MatchStatus::Matched => {
                summary.matched += 1;
                if !r.adjusted_difference.is_zero() {
                    summary.with_variance += 1;
                }
            }
            MatchStatus::Unmatched => summary.unmatched += 1,
        }
        if r.currency_match == Some(false) {
            summary.currency_mismatches += 1;
        }
        if r.adjusted_total.is_some() {
            summary.adjusted_groups += 1;
        }

        summary.external_total = checked_add(
            summary.external_total,
            r.converted_total.unwrap_or(r.external_total),
            "totalling the external side",
        )?;
        summary.internal_total = checked_add(
            summary.internal_total,
            r.internal_total.unwrap_or(Decimal::ZERO),
            "totalling the internal side",
        )?;
        summary.net_difference = checked_add(summary.net_difference, r.difference, "totalling differences")?;
        summary.net_adjusted_difference = checked_add(
            summary.net_adjusted_difference,
            r.adjusted_difference,
            "totalling adjusted differences",
        )?;
    }

    Ok(summary)
}

impl ReconSummary {
    /// True when every group matched, in the same currency, with zero
    /// adjusted difference.
    pub fn is_clean(&self) -> bool {
        self.unmatched == 0 && self.currency_mismatches == 0 && self.with_variance == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn row(status: MatchStatus, ext: i64, int: Option<i64>, currency_match: Option<bool>) -> VarianceRow {
        let ext = Decimal::from(ext);
        let int = int.map(Decimal::from);
        let diff = ext - int.unwrap_or(Decimal::ZERO);
        VarianceRow {
            status,
            match_score: if int.is_some() { 100 } else { 0 },
            external_entity: "e".into(),
            internal_entity: int.map(|_| "i".into()),
            line_id: None,
            currency: "USD".into(),
            internal_currency: None,
            extra: BTreeMap::new(),
            quantity: None,
            external_total: ext,
            converted_total: None,
            internal_total: int,
            difference: diff,
            percentage_difference: None,
            missing_discount: None,
            currency_match,
            adjusted_total: None,
            adjusted_difference: diff,
            adjusted_percentage_difference: None,
            internal_fee: None,
            fee_adjusted_difference: None,
        }
    }

    #[test]
    fn summary_counts() {
        let mut adjusted = row(MatchStatus::Matched, 100, Some(80), Some(true));
        adjusted.adjusted_total = Some(Decimal::from(80));
        adjusted.adjusted_difference = Decimal::ZERO;

        let rows = vec![
            row(MatchStatus::Matched, 100, Some(100), Some(true)),
            row(MatchStatus::Matched, 50, Some(40), Some(false)),
            row(MatchStatus::Unmatched, 7, None, None),
            adjusted,
        ];
        let summary = compute_summary(&rows, 3).unwrap();
        assert_eq!(summary.total_groups, 4);
        assert_eq!(summary.matched, 3);
        assert_eq!(summary.unmatched, 1);
        assert_eq!(summary.currency_mismatches, 1);
        assert_eq!(summary.with_variance, 1);
        assert_eq!(summary.adjusted_groups, 1);
        assert_eq!(summary.adjusted_lines, 3);
        assert_eq!(summary.external_total, Decimal::from(257));
        assert_eq!(summary.internal_total, Decimal::from(220));
        assert_eq!(summary.net_difference, Decimal::from(37));
        assert_eq!(summary.net_adjusted_difference, Decimal::from(17));
        assert!(!summary.is_clean());
    }

    #[test]
    fn all_matched_is_clean() {
        let rows = vec![row(MatchStatus::Matched, 10, Some(10), Some(true))];
        assert!(compute_summary(&rows, 0).unwrap().is_clean());
        assert!(compute_summary(&[], 0).unwrap().is_clean());
    }

    #[test]
    fn overflowing_total_is_an_error() {
        let mut big = row(MatchStatus::Unmatched, 0, None, None);
        big.external_total = Decimal::MAX;
        let err = compute_summary(&[big.clone(), big], 0).unwrap_err();
        assert_eq!(err.to_string(), "decimal overflow while totalling the external side");
    }
}
