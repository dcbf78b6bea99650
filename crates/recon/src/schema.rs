//! Required-field checks and typed coercion of bound fields.
//!
//! Missing columns abort the run before any computation. Cells that fail to
//! parse do not: they become `Value::Null` and are recorded as a
//! `ParseIssue`.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::config::ReconConfig;
use crate::error::{MissingField, ReconError};
use crate::model::{DataQuality, ParseIssue, Period, Record, ReconInput, Table, Value};

/// Check every bound field against the table headers, collecting all
/// missing fields of all tables into one error.
pub fn validate(config: &ReconConfig, input: &ReconInput) -> Result<(), ReconError> {
    let mut missing = Vec::new();

    collect_missing(&input.external, &config.external.required_fields(), &mut missing);
    collect_missing(&input.internal, &config.internal.required_fields(), &mut missing);

    if let Some(ref aux) = config.auxiliary {
        let fields = aux.required_fields();
        match input.auxiliary {
            Some(ref table) => collect_missing(table, &fields, &mut missing),
            // Without rules the lookup is never consulted.
            None if config.overrides.is_empty() => {}
            None => missing.extend(fields.iter().map(|f| MissingField {
                table: "auxiliary".into(),
                field: (*f).to_string(),
            })),
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ReconError::Schema { missing })
    }
}

fn collect_missing(table: &Table, fields: &[&str], out: &mut Vec<MissingField>) {
    for field in fields {
        if !table.has_column(field) {
            out.push(MissingField {
                table: table.name.clone(),
                field: (*field).to_string(),
            });
        }
    }
}

/// Copy `table`'s records with `numeric` fields parsed to decimals and the
/// `date` field parsed to a calendar date.
pub fn coerce(
    table: &Table,
    numeric: &[&str],
    date: Option<&str>,
    quality: &mut DataQuality,
) -> Vec<Record> {
    let mut out = Vec::with_capacity(table.records.len());
    for (row, record) in table.records.iter().enumerate() {
        let mut record = record.clone();
        for field in numeric {
            coerce_field(&mut record, field, row, &table.name, quality, |v| match v {
                Value::Number(d) => Some(Value::Number(*d)),
                Value::Text(s) => parse_amount(s).map(Value::Number),
                _ => None,
            });
        }
        if let Some(field) = date {
            coerce_field(&mut record, field, row, &table.name, quality, |v| match v {
                Value::Date(d) => Some(Value::Date(*d)),
                Value::Text(s) => parse_date(s).map(Value::Date),
                _ => None,
            });
        }
        out.push(record);
    }
    out
}

fn coerce_field<F>(
    record: &mut Record,
    field: &str,
    row: usize,
    table: &str,
    quality: &mut DataQuality,
    parse: F,
) where
    F: Fn(&Value) -> Option<Value>,
{
    let Some(current) = record.fields.get(field) else {
        return;
    };
    // Blank is missing data, not a parse failure.
    if current.is_blank() {
        record.fields.insert(field.to_string(), Value::Null);
        return;
    }
    let parsed = match parse(current) {
        Some(v) => v,
        None => {
            quality.parse_failures += 1;
            quality.issues.push(ParseIssue {
                table: table.to_string(),
                row,
                field: field.to_string(),
                value: current.as_text(),
            });
            Value::Null
        }
    };
    record.fields.insert(field.to_string(), parsed);
}

/// Parse a report amount:
/// - strips `$`, `€`, `£`, thousands commas and whitespace
/// - `(123.45)` -> `-123.45`
/// - accepts scientific notation (`1.5e3`)
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negative, inner) = match trimmed.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let cleaned: String = inner
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    if negative && cleaned.starts_with(|c: char| c == '-' || c == '+') {
        return None;
    }

    let value = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()?;
    Some(if negative { -value } else { value })
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];

/// Parse a date or datetime cell to its calendar date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    // Fractional seconds are dropped before trying the datetime formats.
    let whole = s.split('.').next().unwrap_or(s);
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(whole, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

/// Keep records whose `date` lies in `period`. Records without a parsed date
/// are kept. Returns the kept records and their positions in the input.
pub fn filter_period(
    records: Vec<Record>,
    date: Option<&str>,
    period: Option<&Period>,
) -> (Vec<Record>, Vec<usize>) {
    let keep = |r: &Record| match (date, period) {
        (Some(field), Some(period)) => r.get(field).as_date().map_or(true, |d| period.contains(d)),
        _ => true,
    };
    records
        .into_iter()
        .enumerate()
        .filter(|(_, r)| keep(r))
        .map(|(i, r)| (r, i))
        .unzip()
}
