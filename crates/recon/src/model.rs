use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A single cell value. Loaders produce `Text`; the schema pass coerces
/// bound numeric and date fields, turning unparseable cells into `Null`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(Decimal),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Number(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Text rendering used for grouping keys and name matching.
    /// Null renders as the empty string.
    pub fn as_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Number(d) => d.normalize().to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// True for Null and for whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Self::Number(d)
    }
}

/// One row of a source table, keyed by column name. Never mutated after the
/// schema pass; overrides produce new line values instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }
}

/// A named record set with its declared columns.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            columns,
            records,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Half-open reporting window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

/// Pre-loaded tables for one run.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub external: Table,
    pub internal: Table,
    pub auxiliary: Option<Table>,
    pub period: Option<Period>,
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Records grouped by an exact key tuple, with per-field sums.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    /// Group key values, in the order of the grouping fields.
    pub key: Vec<String>,
    /// Summed fields. Nulls count as zero.
    pub sums: BTreeMap<String, Decimal>,
    /// Indices of contributing records in the source slice.
    pub record_indices: Vec<usize>,
}

impl AggregateRow {
    pub fn sum(&self, field: &str) -> Decimal {
        self.sums.get(field).copied().unwrap_or(Decimal::ZERO)
    }
}

/// A side's aggregate projected onto the reconciliation fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideGroup {
    /// Raw value of the matching field (entity name or line id).
    pub match_value: String,
    /// Raw entity name (equal to `match_value` in fuzzy mode).
    pub entity: String,
    pub currency: String,
    /// Extra `group_by` values keyed by field name.
    pub extra: BTreeMap<String, String>,
    pub quantity: Option<Decimal>,
    pub total: Decimal,
    /// Summed allowable fee, when the side binds one.
    pub fee: Option<Decimal>,
    pub record_count: usize,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Best candidate for one left record. Many left records may name the same
/// right index; nothing here implies a one-to-one assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub left: usize,
    pub right: Option<usize>,
    pub score: u8,
}

impl MatchResult {
    pub fn unmatched(left: usize) -> Self {
        Self {
            left,
            right: None,
            score: 0,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.right.is_some()
    }
}

// ---------------------------------------------------------------------------
// Variance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    Unmatched,
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matched => write!(f, "matched"),
            Self::Unmatched => write!(f, "unmatched"),
        }
    }
}

/// One reconciled external group with its internal counterpart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceRow {
    pub status: MatchStatus,
    pub match_score: u8,
    pub external_entity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_entity: Option<String>,
    /// Line identifier, present in `exact_key` mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_id: Option<String>,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_currency: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    /// External total in its own currency.
    pub external_total: Decimal,
    /// External total converted into the reporting currency (FX configured).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_total: Option<Decimal>,
    /// Internal total; `None` when there is no counterpart.
    pub internal_total: Option<Decimal>,
    pub difference: Decimal,
    pub percentage_difference: Option<Decimal>,
    /// `1 - internal / external`; `None` when unmatched or external is zero.
    pub missing_discount: Option<Decimal>,
    /// `None` when unmatched.
    pub currency_match: Option<bool>,
    /// Re-aggregated external total after overrides, comparison currency.
    pub adjusted_total: Option<Decimal>,
    pub adjusted_difference: Decimal,
    pub adjusted_percentage_difference: Option<Decimal>,
    /// Counterpart's allowable fee (internal `fee` binding).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_fee: Option<Decimal>,
    /// Adjusted difference less the allowable fee; present only when the
    /// internal side binds a fee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_adjusted_difference: Option<Decimal>,
}

impl VarianceRow {
    /// The figure rollups sum: the fee-adjusted difference when a fee is
    /// bound, the adjusted difference otherwise.
    pub fn final_difference(&self) -> Decimal {
        self.fee_adjusted_difference.unwrap_or(self.adjusted_difference)
    }
}

// ---------------------------------------------------------------------------
// Rollup
// ---------------------------------------------------------------------------

/// Variance rows summed by one `group_by` value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupRow {
    pub key: String,
    /// Variance rows folded into this entry.
    pub groups: usize,
    /// Sum of each row's final difference.
    pub total_difference: Decimal,
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// A line the override engine selected, with before/after values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustmentDetail {
    pub rule: String,
    /// Position of the line in the external table.
    pub row: usize,
    pub entity: String,
    pub currency: String,
    pub line_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<String>,
    pub status: String,
    pub before: Option<Decimal>,
    pub after: Option<Decimal>,
    pub adjusted: bool,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Data quality
// ---------------------------------------------------------------------------

/// A cell that failed numeric/date coercion and was nulled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseIssue {
    pub table: String,
    pub row: usize,
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataQuality {
    pub parse_failures: usize,
    pub issues: Vec<ParseIssue>,
    /// External groups dropped by the positive-activity filter.
    pub dropped_non_positive: usize,
    /// Rows removed by the reporting-period filter, per table.
    pub out_of_period: BTreeMap<String, usize>,
    /// Auxiliary line ids seen more than once (values were summed).
    pub duplicate_auxiliary_lines: usize,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconSummary {
    pub total_groups: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub currency_mismatches: usize,
    pub adjusted_groups: usize,
    pub adjusted_lines: usize,
    /// Matched groups whose adjusted difference is non-zero.
    pub with_variance: usize,
    pub external_total: Decimal,
    pub internal_total: Decimal,
    pub net_difference: Decimal,
    pub net_adjusted_difference: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub strategy: String,
    pub threshold: u8,
    pub engine_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting_currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
    /// Field the rollup table is keyed by.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollup_by: Option<String>,
}

/// Variance report plus adjusted-line detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconReport {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub rows: Vec<VarianceRow>,
    /// Present when `rollup_by` is configured; largest total first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rollup: Vec<RollupRow>,
    pub adjustments: Vec<AdjustmentDetail>,
    pub quality: DataQuality,
}
