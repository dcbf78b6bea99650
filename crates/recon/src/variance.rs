use rust_decimal::Decimal;

use crate::error::{checked_sub, ReconError};
use crate::model::{MatchResult, MatchStatus, SideGroup, VarianceRow};

/// `(left - right) / right * 100`, or `None` when `right` is zero.
pub fn percentage_difference(left: Decimal, right: Decimal) -> Option<Decimal> {
    if right.is_zero() {
        return None;
    }
    left.checked_sub(right)
        .and_then(|d| d.checked_div(right))
        .and_then(|q| q.checked_mul(Decimal::ONE_HUNDRED))
}

/// `1 - internal / external`: the share of the external figure missing
/// from the internal one. `None` when the external figure is zero.
pub fn missing_discount(external: Decimal, internal: Decimal) -> Option<Decimal> {
    if external.is_zero() {
        return None;
    }
    internal
        .checked_div(external)
        .and_then(|q| Decimal::ONE.checked_sub(q))
}

/// External group prepared for comparison.
#[derive(Debug, Clone)]
pub struct LeftSide<'a> {
    pub group: &'a SideGroup,
    /// FX-converted total, when a reporting currency is configured.
    pub converted: Option<Decimal>,
    /// Currency the comparison total is expressed in.
    pub comparison_currency: &'a str,
    pub line_id: Option<String>,
    /// The internal side binds a fee column.
    pub fee_bound: bool,
}

impl LeftSide<'_> {
    pub fn comparison_total(&self) -> Decimal {
        self.converted.unwrap_or(self.group.total)
    }
}

/// Join one external group with its match and derive the variance fields.
/// An unmatched row compares against zero but leaves every internal field
/// `None`, so "no counterpart" stays distinct from "counterpart sums to 0".
pub fn variance_row(
    left: &LeftSide<'_>,
    right: Option<&SideGroup>,
    m: &MatchResult,
) -> Result<VarianceRow, ReconError> {
    let compare = left.comparison_total();
    let right_total = right.map(|r| r.total);
    let denominator = right_total.unwrap_or(Decimal::ZERO);
    let difference = checked_sub(compare, denominator, &difference_context(left))?;

    let mut row = VarianceRow {
        status: if right.is_some() { MatchStatus::Matched } else { MatchStatus::Unmatched },
        match_score: if right.is_some() { m.score } else { 0 },
        external_entity: left.group.entity.clone(),
        internal_entity: right.map(|r| r.entity.clone()),
        line_id: left.line_id.clone(),
        currency: left.group.currency.clone(),
        internal_currency: right.map(|r| r.currency.clone()),
        extra: left.group.extra.clone(),
        quantity: left.group.quantity,
        external_total: left.group.total,
        converted_total: left.converted,
        internal_total: right_total,
        difference,
        percentage_difference: percentage_difference(compare, denominator),
        missing_discount: right_total.and_then(|t| missing_discount(compare, t)),
        currency_match: right.map(|r| r.currency == left.comparison_currency),
        adjusted_total: None,
        adjusted_difference: difference,
        adjusted_percentage_difference: percentage_difference(compare, denominator),
        internal_fee: if left.fee_bound { right.and_then(|r| r.fee) } else { None },
        fee_adjusted_difference: None,
    };
    if left.fee_bound {
        row.fee_adjusted_difference = Some(fee_adjusted(&row)?);
    }
    Ok(row)
}

/// Recompute the adjusted columns against a re-aggregated external total.
/// `None` leaves the adjusted columns equal to the original ones.
pub fn apply_adjusted_total(row: &mut VarianceRow, adjusted: Option<Decimal>) -> Result<(), ReconError> {
    let original = row.converted_total.unwrap_or(row.external_total);
    let denominator = row.internal_total.unwrap_or(Decimal::ZERO);
    let effective = adjusted.unwrap_or(original);
    row.adjusted_total = adjusted;
    row.adjusted_difference = checked_sub(effective, denominator, &format!("adjusting '{}'", row.external_entity))?;
    row.adjusted_percentage_difference = percentage_difference(effective, denominator);
    if row.fee_adjusted_difference.is_some() {
        row.fee_adjusted_difference = Some(fee_adjusted(row)?);
    }
    Ok(())
}

/// Adjusted difference less the counterpart's allowable fee. An unmatched
/// row has no fee to allow, so it keeps its full difference.
fn fee_adjusted(row: &VarianceRow) -> Result<Decimal, ReconError> {
    checked_sub(
        row.adjusted_difference,
        row.internal_fee.unwrap_or(Decimal::ZERO),
        &format!("deducting the fee for '{}'", row.external_entity),
    )
}

fn difference_context(left: &LeftSide<'_>) -> String {
    format!("comparing '{}' {}", left.group.entity, left.group.currency)
}
