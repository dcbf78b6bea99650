//! Rule-driven line corrections applied before the final variance.
//!
//! Rules are tried in declaration order; the first rule whose selector and
//! condition both hold replaces the line's monetary value. The input records
//! are never touched: the engine gets a corrected copy and re-aggregates it.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::{
    AuxiliaryConfig, EntitySelector, OverrideCondition, OverrideRule, Replacement, SideConfig,
};
use crate::error::{checked_add, ReconError};
use crate::model::{AdjustmentDetail, Record, Table, Value};
use crate::normalize::Normalizer;

// ---------------------------------------------------------------------------
// Auxiliary lookup
// ---------------------------------------------------------------------------

/// Internal per-line evidence keyed by line identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxiliaryEntry {
    pub promotion: Option<String>,
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
pub struct AuxiliaryLookup {
    entries: BTreeMap<String, AuxiliaryEntry>,
    duplicates: usize,
}

impl AuxiliaryLookup {
    /// Repeated line ids are folded: amounts summed, first non-blank
    /// promotion kept.
    pub fn build(table: &Table, config: &AuxiliaryConfig) -> Result<Self, ReconError> {
        let mut entries: BTreeMap<String, AuxiliaryEntry> = BTreeMap::new();
        let mut duplicates = 0;

        for record in &table.records {
            let id = record.get(&config.line_id).as_text().trim().to_string();
            if id.is_empty() {
                continue;
            }
            let promotion = non_blank(record.get(&config.promotion));
            let amount = record.get(&config.amount).as_decimal();

            match entries.get_mut(&id) {
                Some(entry) => {
                    duplicates += 1;
                    if entry.promotion.is_none() {
                        entry.promotion = promotion;
                    }
                    entry.amount = match (entry.amount, amount) {
                        (Some(a), Some(b)) => {
                            Some(checked_add(a, b, &format!("folding auxiliary line '{id}'"))?)
                        }
                        (a, b) => a.or(b),
                    };
                }
                None => {
                    entries.insert(id, AuxiliaryEntry { promotion, amount });
                }
            }
        }

        Ok(Self {
            entries,
            duplicates,
        })
    }

    pub fn get(&self, line_id: &str) -> Option<&AuxiliaryEntry> {
        self.entries.get(line_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows folded into an earlier row with the same line id.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

fn non_blank(value: &Value) -> Option<String> {
    if value.is_blank() {
        None
    } else {
        Some(value.as_text().trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Rule evaluation
// ---------------------------------------------------------------------------

/// A rule with its selector pre-normalized.
struct CompiledRule<'a> {
    rule: &'a OverrideRule,
    canonical: Option<String>,
    contains_lower: Option<String>,
}

impl<'a> CompiledRule<'a> {
    fn new(rule: &'a OverrideRule, normalizer: &Normalizer) -> Self {
        let (canonical, contains_lower) = match &rule.entity {
            EntitySelector::Canonical(v) => (Some(normalizer.normalize(v)), None),
            EntitySelector::Contains(v) => (None, Some(v.to_lowercase())),
            EntitySelector::Equals(_) => (None, None),
        };
        Self {
            rule,
            canonical,
            contains_lower,
        }
    }

    fn selects(&self, entity: &str, canonical_entity: &str) -> bool {
        match &self.rule.entity {
            EntitySelector::Equals(v) => entity == v,
            EntitySelector::Contains(_) => self
                .contains_lower
                .as_deref()
                .is_some_and(|needle| entity.to_lowercase().contains(needle)),
            EntitySelector::Canonical(_) => {
                !canonical_entity.is_empty() && self.canonical.as_deref() == Some(canonical_entity)
            }
        }
    }

    fn condition_holds(&self, promotion: Option<&str>, aux: Option<&AuxiliaryEntry>) -> bool {
        match self.rule.condition {
            OverrideCondition::Always => true,
            OverrideCondition::PromotionUnconfirmed => {
                promotion.is_some() && aux.and_then(|a| a.promotion.as_ref()).is_none()
            }
        }
    }

    fn replacement(&self, aux: Option<&AuxiliaryEntry>) -> Option<Decimal> {
        match self.rule.replacement {
            Replacement::AuxiliaryAmount => aux.and_then(|a| a.amount),
        }
    }

    fn reason(&self, aux: Option<&AuxiliaryEntry>) -> String {
        match (self.rule.condition, aux) {
            (OverrideCondition::PromotionUnconfirmed, None) => {
                "reported promotion; line absent from auxiliary lookup".into()
            }
            (OverrideCondition::PromotionUnconfirmed, Some(_)) => {
                "reported promotion; no internal promotion for line".into()
            }
            (OverrideCondition::Always, _) => "unconditional replacement".into(),
        }
    }
}

/// Corrected external lines plus the detail of every selected line.
#[derive(Debug, Clone, Default)]
pub struct OverrideOutcome {
    /// Copy of the input records with replacements applied.
    pub lines: Vec<Record>,
    /// Positions of lines selected by at least one rule.
    pub touched: BTreeSet<usize>,
    pub details: Vec<AdjustmentDetail>,
    pub adjusted_lines: usize,
    /// Lines where more than one rule would have applied.
    pub conflicts: usize,
}

/// Sum of a line's amount fields; `None` when all of them are null.
pub fn line_total(record: &Record, amount_fields: &[String]) -> Result<Option<Decimal>, ReconError> {
    let mut total = None;
    for v in amount_fields.iter().filter_map(|f| record.get(f).as_decimal()) {
        total = Some(checked_add(total.unwrap_or(Decimal::ZERO), v, "summing a line's amount fields")?);
    }
    Ok(total)
}

/// Apply `rules` to the external lines.
///
/// `entity_of` yields the raw entity name to select on (aliases applied).
pub fn apply_overrides<F>(
    records: &[Record],
    side: &SideConfig,
    entity_of: F,
    rules: &[OverrideRule],
    lookup: &AuxiliaryLookup,
    normalizer: &Normalizer,
) -> Result<OverrideOutcome, ReconError>
where
    F: Fn(&Record) -> String,
{
    let mut outcome = OverrideOutcome {
        lines: records.to_vec(),
        ..OverrideOutcome::default()
    };
    if rules.is_empty() {
        return Ok(outcome);
    }

    let compiled: Vec<CompiledRule<'_>> = rules.iter().map(|r| CompiledRule::new(r, normalizer)).collect();
    let needs_canonical = compiled.iter().any(|c| c.canonical.is_some());
    let mut conflict_pairs: BTreeMap<(String, String), usize> = BTreeMap::new();

    for (row, record) in records.iter().enumerate() {
        let entity = entity_of(record);
        let canonical = if needs_canonical {
            normalizer.normalize(&entity)
        } else {
            String::new()
        };

        let selecting: Vec<&CompiledRule<'_>> =
            compiled.iter().filter(|c| c.selects(&entity, &canonical)).collect();
        let Some(first_selecting) = selecting.first() else {
            continue;
        };

        let line_id = side
            .line_id
            .as_deref()
            .map(|f| side.line_key(&record.get(f).as_text()))
            .unwrap_or_default();
        let promotion = side.promotion.as_deref().and_then(|f| non_blank(record.get(f)));
        let aux = if line_id.is_empty() { None } else { lookup.get(&line_id) };

        let applying: Vec<&&CompiledRule<'_>> = selecting
            .iter()
            .filter(|c| c.condition_holds(promotion.as_deref(), aux))
            .collect();

        if applying.len() > 1 {
            outcome.conflicts += 1;
            let winner = applying[0].rule.name.clone();
            for loser in &applying[1..] {
                *conflict_pairs
                    .entry((winner.clone(), loser.rule.name.clone()))
                    .or_default() += 1;
            }
            debug!(row, line_id = %line_id, winner = %winner, "override conflict; first rule wins");
        }

        let before = line_total(record, &side.amount)?;
        let original_status = side
            .status
            .as_deref()
            .map(|f| record.get(f).as_text())
            .unwrap_or_default();

        let detail = match applying.first() {
            Some(rule) => {
                let after = rule.replacement(aux);
                let corrected = &mut outcome.lines[row];
                replace_amount(corrected, &side.amount, after);
                if let Some(ref status_field) = side.status {
                    corrected
                        .fields
                        .insert(status_field.clone(), Value::Text(rule.rule.status.clone()));
                }
                outcome.adjusted_lines += 1;
                debug!(
                    rule = %rule.rule.name,
                    row,
                    line_id = %line_id,
                    before = ?before,
                    after = ?after,
                    "override applied"
                );
                AdjustmentDetail {
                    rule: rule.rule.name.clone(),
                    row,
                    entity: entity.clone(),
                    currency: record.get(&side.currency).as_text(),
                    line_id: line_id.clone(),
                    promotion: promotion.clone(),
                    status: rule.rule.status.clone(),
                    before,
                    after,
                    adjusted: true,
                    reason: rule.reason(aux),
                }
            }
            None => AdjustmentDetail {
                rule: first_selecting.rule.name.clone(),
                row,
                entity: entity.clone(),
                currency: record.get(&side.currency).as_text(),
                line_id: line_id.clone(),
                promotion: promotion.clone(),
                status: original_status,
                before,
                after: before,
                adjusted: false,
                reason: format!("condition '{}' not met", first_selecting.rule.condition),
            },
        };

        outcome.touched.insert(row);
        outcome.details.push(detail);
    }

    for ((winner, loser), count) in &conflict_pairs {
        warn!(winner = %winner, shadowed = %loser, lines = count, "override rules overlap");
    }

    Ok(outcome)
}

/// Write `value` into the first amount field and zero the rest, so the
/// line's total equals the replacement.
fn replace_amount(record: &mut Record, amount_fields: &[String], value: Option<Decimal>) {
    for (i, field) in amount_fields.iter().enumerate() {
        let v = if i == 0 {
            value.map(Value::Number).unwrap_or(Value::Null)
        } else {
            Value::Number(Decimal::ZERO)
        };
        record.fields.insert(field.clone(), v);
    }
}
