use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconConfig {
    pub name: String,
    #[serde(default)]
    pub strategy: MatchStrategy,
    /// External `group_by` field whose values key the rollup table.
    #[serde(default)]
    pub rollup_by: Option<String>,
    pub external: SideConfig,
    pub internal: SideConfig,
    #[serde(default)]
    pub auxiliary: Option<AuxiliaryConfig>,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub blocking: BlockingConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Raw external name -> corrected raw name, applied before normalization.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub fx: Option<FxConfig>,
    #[serde(default)]
    pub overrides: Vec<OverrideRule>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Normalize entity names and pick the best token-set match.
    #[default]
    FuzzyEntity,
    /// Pair groups by exact line identifier.
    ExactKey,
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FuzzyEntity => write!(f, "fuzzy_entity"),
            Self::ExactKey => write!(f, "exact_key"),
        }
    }
}

// ---------------------------------------------------------------------------
// Field bindings
// ---------------------------------------------------------------------------

/// Column bindings for one ledger.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SideConfig {
    /// CSV path for the CLI; the engine ignores it.
    #[serde(default)]
    pub file: Option<String>,
    pub entity: String,
    pub currency: String,
    /// Monetary fields summed per row, null counting as zero.
    pub amount: Vec<String>,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub line_id: Option<String>,
    /// Keep only the part of the line id before this delimiter.
    #[serde(default)]
    pub line_id_split: Option<String>,
    #[serde(default)]
    pub promotion: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub group_by: Vec<String>,
    /// Allowable transaction fee, summed per group and deducted from the
    /// difference. Internal side only.
    #[serde(default)]
    pub fee: Option<String>,
}

impl SideConfig {
    /// Every field this side reads from its table.
    pub fn required_fields(&self) -> Vec<&str> {
        let mut out = vec![self.entity.as_str(), self.currency.as_str()];
        out.extend(self.amount.iter().map(String::as_str));
        for f in [&self.quantity, &self.line_id, &self.promotion, &self.status, &self.date, &self.fee]
            .into_iter()
            .flatten()
        {
            out.push(f.as_str());
        }
        out.extend(self.group_by.iter().map(String::as_str));
        dedup_preserving_order(out)
    }

    /// Fields coerced to numbers during the schema pass.
    pub fn numeric_fields(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.amount.iter().map(String::as_str).collect();
        if let Some(ref q) = self.quantity {
            out.push(q);
        }
        if let Some(ref fee) = self.fee {
            out.push(fee);
        }
        dedup_preserving_order(out)
    }

    /// Extract the line identifier of a raw value, honoring `line_id_split`.
    pub fn line_key(&self, raw: &str) -> String {
        let raw = raw.trim();
        match self.line_id_split.as_deref() {
            Some(delim) if !delim.is_empty() => {
                raw.split(delim).next().unwrap_or("").to_string()
            }
            _ => raw.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuxiliaryConfig {
    #[serde(default)]
    pub file: Option<String>,
    pub line_id: String,
    pub promotion: String,
    pub amount: String,
}

impl AuxiliaryConfig {
    pub fn required_fields(&self) -> Vec<&str> {
        dedup_preserving_order(vec![
            self.line_id.as_str(),
            self.promotion.as_str(),
            self.amount.as_str(),
        ])
    }
}

fn dedup_preserving_order(fields: Vec<&str>) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    fields.into_iter().filter(|f| seen.insert(*f)).collect()
}

// ---------------------------------------------------------------------------
// Normalize / blocking / matching
// ---------------------------------------------------------------------------

/// Legal-entity suffixes removed by the normalizer.
pub const DEFAULT_SUFFIXES: &[&str] = &[
    "ltd", "limited", "inc", "corp", "corporation", "co", "company", "gmbh", "ag", "plc",
    "llc", "llp", "pte", "pty", "bv", "nv", "sas", "sl", "sa", "sp z o o", "spzoo", "oy",
    "oyj", "ab",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizeConfig {
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            suffixes: default_suffixes(),
        }
    }
}

fn default_suffixes() -> Vec<String> {
    DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingKey {
    /// First `prefix_len` characters of the canonical key.
    #[default]
    Prefix,
    /// First whole token of the canonical key.
    FirstToken,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockingConfig {
    #[serde(default = "default_prefix_len")]
    pub prefix_len: usize,
    #[serde(default)]
    pub key: BlockingKey,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            prefix_len: default_prefix_len(),
            key: BlockingKey::default(),
        }
    }
}

fn default_prefix_len() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    #[serde(default = "default_threshold")]
    pub threshold: u8,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> u8 {
    90
}

// ---------------------------------------------------------------------------
// FX
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FxConfig {
    pub reporting_currency: String,
    /// Currency code -> units of reporting currency per unit.
    #[serde(default)]
    pub rates: BTreeMap<String, Decimal>,
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// One correction rule. Rules are tried in declaration order and the first
/// whose selector and condition hold for a line wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideRule {
    pub name: String,
    pub entity: EntitySelector,
    #[serde(default)]
    pub condition: OverrideCondition,
    #[serde(default)]
    pub replacement: Replacement,
    /// Status written onto adjusted lines.
    #[serde(default = "default_adjusted_status")]
    pub status: String,
}

fn default_adjusted_status() -> String {
    "Adjusted".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySelector {
    /// Raw entity name equals this value exactly.
    Equals(String),
    /// Raw entity name contains this value, case-insensitive.
    Contains(String),
    /// Canonical entity key equals the canonical form of this value.
    Canonical(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideCondition {
    /// The report marks the line as promotional but the auxiliary lookup
    /// has no promotion (or no row) for that line.
    #[default]
    PromotionUnconfirmed,
    /// Every selected line is replaced.
    Always,
}

impl std::fmt::Display for OverrideCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PromotionUnconfirmed => write!(f, "promotion_unconfirmed"),
            Self::Always => write!(f, "always"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Replacement {
    /// Use the auxiliary lookup's amount for the line (null when absent).
    #[default]
    AuxiliaryAmount,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let invalid = |msg: String| Err(ReconError::ConfigValidation(msg));

        if self.matching.threshold > 100 {
            return invalid(format!(
                "matching.threshold must be within 0..=100, got {}",
                self.matching.threshold
            ));
        }
        if self.blocking.prefix_len == 0 {
            return invalid("blocking.prefix_len must be at least 1".into());
        }

        for (side, cfg) in [("external", &self.external), ("internal", &self.internal)] {
            if cfg.amount.is_empty() {
                return invalid(format!("{side}.amount must name at least one field"));
            }
            if cfg.entity.trim().is_empty() || cfg.currency.trim().is_empty() {
                return invalid(format!("{side}: entity and currency bindings are required"));
            }
            if self.strategy == MatchStrategy::ExactKey && cfg.line_id.is_none() {
                return invalid(format!("{side}.line_id is required for strategy 'exact_key'"));
            }
        }

        if self.external.fee.is_some() {
            return invalid("fee is read from the internal side only; move it to [internal]".into());
        }
        if let Some(ref field) = self.rollup_by {
            if !self.external.group_by.contains(field) {
                return invalid(format!(
                    "rollup_by '{field}' must also be listed in external.group_by"
                ));
            }
        }

        if let Some(ref fx) = self.fx {
            if fx.reporting_currency.trim().is_empty() {
                return invalid("fx.reporting_currency must not be empty".into());
            }
            if let Some((cur, _)) = fx.rates.iter().find(|(_, r)| r.is_sign_negative()) {
                return invalid(format!("fx.rates.{cur} must not be negative"));
            }
        }

        let mut names = BTreeSet::new();
        for rule in &self.overrides {
            if !names.insert(rule.name.as_str()) {
                return invalid(format!("duplicate override rule name '{}'", rule.name));
            }
            if self.auxiliary.is_none() {
                return invalid(format!(
                    "override '{}' requires an [auxiliary] section",
                    rule.name
                ));
            }
            if self.external.line_id.is_none() {
                return invalid(format!(
                    "override '{}' requires external.line_id",
                    rule.name
                ));
            }
            if rule.condition == OverrideCondition::PromotionUnconfirmed
                && self.external.promotion.is_none()
            {
                return invalid(format!(
                    "override '{}': condition 'promotion_unconfirmed' requires external.promotion",
                    rule.name
                ));
            }
        }

        Ok(())
    }

    /// Comparison currency of the external side after FX, if configured.
    pub fn reporting_currency(&self) -> Option<&str> {
        self.fx.as_ref().map(|fx| fx.reporting_currency.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
