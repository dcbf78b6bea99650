use std::fmt;

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (bad threshold, missing binding, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// One or more required fields are absent from the input tables.
    /// Raised before any computation starts.
    #[error("missing required fields: {}", MissingList(.missing))]
    Schema { missing: Vec<MissingField> },
    /// A currency present in the data has no configured FX rate.
    #[error("no FX rate configured for currency '{currency}'")]
    MissingFxRate { currency: String },
    /// CSV decode error while loading a table.
    #[error("table '{table}': {message}")]
    Csv { table: String, message: String },
    /// A sum, difference or conversion left the decimal range.
    #[error("decimal overflow while {context}")]
    Overflow { context: String },
}

impl ReconError {
    pub(crate) fn overflow(context: impl Into<String>) -> Self {
        Self::Overflow { context: context.into() }
    }
}

/// `a + b`, or an overflow error naming what was being summed.
pub(crate) fn checked_add(a: Decimal, b: Decimal, context: &str) -> Result<Decimal, ReconError> {
    a.checked_add(b).ok_or_else(|| ReconError::overflow(context))
}

/// `a - b`, or an overflow error naming what was being compared.
pub(crate) fn checked_sub(a: Decimal, b: Decimal, context: &str) -> Result<Decimal, ReconError> {
    a.checked_sub(b).ok_or_else(|| ReconError::overflow(context))
}

/// A field the config binds that the named table does not carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    pub table: String,
    pub field: String,
}

struct MissingList<'a>(&'a [MissingField]);

impl fmt::Display for MissingList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, m) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}.'{}'", m.table, m.field)?;
        }
        Ok(())
    }
}
