use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate_by, retain_positive};
use crate::config::{MatchStrategy, ReconConfig, SideConfig};
use crate::error::ReconError;
use crate::matcher::{match_exact, Matcher};
use crate::model::{
    AggregateRow, DataQuality, MatchResult, Record, ReconInput, ReconMeta, ReconReport, SideGroup,
    Table, Value, VarianceRow,
};
use crate::normalize::Normalizer;
use crate::error::checked_add;
use crate::overrides::{apply_overrides, line_total, AuxiliaryLookup};
use crate::rollup::rollup;
use crate::schema;
use crate::summary::compute_summary;
use crate::variance::{apply_adjusted_total, variance_row, LeftSide};

/// Run reconciliation per config. Returns the variance report, the
/// optional rollup, the adjusted-line detail and data-quality counters.
pub fn run(config: &ReconConfig, input: &ReconInput) -> Result<ReconReport, ReconError> {
    schema::validate(config, input)?;
    info!(
        config = %config.name,
        strategy = %config.strategy,
        external_rows = input.external.records.len(),
        internal_rows = input.internal.records.len(),
        "reconciliation started"
    );

    let mut quality = DataQuality::default();
    let (mut external_records, external_positions) =
        prepare(&input.external, &config.external, input, &mut quality);
    let (internal_records, _) = prepare(&input.internal, &config.internal, input, &mut quality);

    apply_aliases(&mut external_records, &config.external.entity, &config.aliases);

    // Aggregate
    let ext_grouping = Grouping::new(&config.external, config.strategy);
    let int_grouping = Grouping::new(&config.internal, config.strategy);

    let mut ext_aggs = ext_grouping.aggregate(&external_records)?;
    if let Some(ref qty) = config.external.quantity {
        let (kept, dropped) = retain_positive(ext_aggs, qty);
        ext_aggs = kept;
        quality.dropped_non_positive = dropped;
    }
    let int_aggs = int_grouping.aggregate(&internal_records)?;

    let left: Vec<SideGroup> = ext_aggs
        .iter()
        .map(|a| ext_grouping.project(a, &external_records))
        .collect::<Result<_, _>>()?;
    let right: Vec<SideGroup> = int_aggs
        .iter()
        .map(|a| int_grouping.project(a, &internal_records))
        .collect::<Result<_, _>>()?;
    debug!(
        external_groups = left.len(),
        internal_groups = right.len(),
        dropped_non_positive = quality.dropped_non_positive,
        "aggregated"
    );

    // FX
    let converted: Vec<Option<Decimal>> = match config.fx {
        Some(ref fx) => left
            .iter()
            .map(|g| fx.convert(g.total, &g.currency).map(Some))
            .collect::<Result<_, _>>()?,
        None => vec![None; left.len()],
    };

    // Match
    let matches = match_groups(config, &left, &right);
    debug!(
        matched = matches.iter().filter(|m| m.is_matched()).count(),
        unmatched = matches.iter().filter(|m| !m.is_matched()).count(),
        threshold = config.matching.threshold,
        "matched"
    );

    // Variance
    let fee_bound = config.internal.fee.is_some();
    let mut rows: Vec<VarianceRow> = left
        .iter()
        .zip(&converted)
        .zip(&matches)
        .map(|((group, conv), m)| {
            let side = LeftSide {
                group,
                converted: *conv,
                comparison_currency: config.reporting_currency().unwrap_or(&group.currency),
                line_id: match config.strategy {
                    MatchStrategy::ExactKey => Some(group.match_value.clone()),
                    MatchStrategy::FuzzyEntity => None,
                },
                fee_bound,
            };
            variance_row(&side, m.right.map(|ri| &right[ri]), m)
        })
        .collect::<Result<_, _>>()?;

    // Overrides
    let mut adjustments = Vec::new();
    let mut adjusted_lines = 0;
    if !config.overrides.is_empty() {
        let lookup = match (&config.auxiliary, &input.auxiliary) {
            (Some(aux_config), Some(aux_table)) => {
                let mut aux = aux_table.clone();
                aux.records = schema::coerce(aux_table, &[aux_config.amount.as_str()], None, &mut quality);
                AuxiliaryLookup::build(&aux, aux_config)?
            }
            _ => AuxiliaryLookup::default(),
        };
        quality.duplicate_auxiliary_lines = lookup.duplicates();

        let entity_field = config.external.entity.as_str();
        let normalizer = Normalizer::new(&config.normalize.suffixes);
        let outcome = apply_overrides(
            &external_records,
            &config.external,
            |r| r.get(entity_field).as_text(),
            &config.overrides,
            &lookup,
            &normalizer,
        )?;

        // Re-aggregate every group holding a selected line from the
        // corrected line values.
        for (row, agg) in rows.iter_mut().zip(&ext_aggs) {
            if !agg.record_indices.iter().any(|i| outcome.touched.contains(i)) {
                continue;
            }
            let mut total = Decimal::ZERO;
            for &i in &agg.record_indices {
                if let Some(v) = line_total(&outcome.lines[i], &config.external.amount)? {
                    total = checked_add(total, v, "re-aggregating adjusted lines")?;
                }
            }
            let adjusted = match config.fx {
                Some(ref fx) => fx.convert(total, &row.currency)?,
                None => total,
            };
            apply_adjusted_total(row, Some(adjusted))?;
        }

        adjusted_lines = outcome.adjusted_lines;
        adjustments = outcome.details;
        for detail in &mut adjustments {
            detail.row = external_positions[detail.row];
        }
        debug!(
            adjusted_lines,
            selected_lines = adjustments.len(),
            conflicts = outcome.conflicts,
            "overrides applied"
        );
    }

    if quality.parse_failures > 0 {
        warn!(count = quality.parse_failures, "cells failed to parse and were treated as null");
    }

    let summary = compute_summary(&rows, adjusted_lines)?;
    let rollup = match config.rollup_by {
        Some(ref field) => rollup(&rows, field)?,
        None => Vec::new(),
    };
    info!(
        groups = summary.total_groups,
        matched = summary.matched,
        unmatched = summary.unmatched,
        adjusted_groups = summary.adjusted_groups,
        "reconciliation finished"
    );

    Ok(ReconReport {
        meta: ReconMeta {
            config_name: config.name.clone(),
            strategy: config.strategy.to_string(),
            threshold: config.matching.threshold,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            reporting_currency: config.reporting_currency().map(str::to_string),
            period: input.period,
            rollup_by: config.rollup_by.clone(),
        },
        summary,
        rows,
        rollup,
        adjustments,
        quality,
    })
}

/// Coerce bound fields and apply the reporting period. Returns the kept
/// records with their positions in the source table.
fn prepare(
    table: &Table,
    side: &SideConfig,
    input: &ReconInput,
    quality: &mut DataQuality,
) -> (Vec<Record>, Vec<usize>) {
    let records = schema::coerce(table, &side.numeric_fields(), side.date.as_deref(), quality);
    let before = records.len();
    let (kept, positions) = schema::filter_period(records, side.date.as_deref(), input.period.as_ref());
    if kept.len() < before {
        quality
            .out_of_period
            .insert(table.name.clone(), before - kept.len());
    }
    (kept, positions)
}

fn apply_aliases(records: &mut [Record], entity_field: &str, aliases: &BTreeMap<String, String>) {
    if aliases.is_empty() {
        return;
    }
    for record in records {
        let raw = record.get(entity_field).as_text();
        if let Some(target) = aliases.get(&raw) {
            record
                .fields
                .insert(entity_field.to_string(), Value::Text(target.clone()));
        }
    }
}

fn match_groups(config: &ReconConfig, left: &[SideGroup], right: &[SideGroup]) -> Vec<MatchResult> {
    match config.strategy {
        MatchStrategy::FuzzyEntity => {
            let normalizer = Normalizer::new(&config.normalize.suffixes);
            let left_keys: Vec<String> = left.iter().map(|g| normalizer.normalize(&g.match_value)).collect();
            let right_keys: Vec<String> = right.iter().map(|g| normalizer.normalize(&g.match_value)).collect();
            Matcher::new(&right_keys, &config.blocking, config.matching.threshold).match_all(&left_keys)
        }
        MatchStrategy::ExactKey => {
            let left_keys: Vec<&str> = left.iter().map(|g| g.match_value.as_str()).collect();
            let right_keys: Vec<&str> = right.iter().map(|g| g.match_value.as_str()).collect();
            match_exact(&left_keys, &right_keys)
        }
    }
}

/// How one side's records are keyed and summed.
///
/// Key layout: `[match value, currency, group_by...]`, where the match value
/// is the raw entity name (fuzzy) or the split line id (exact).
struct Grouping<'a> {
    side: &'a SideConfig,
    strategy: MatchStrategy,
}

impl<'a> Grouping<'a> {
    fn new(side: &'a SideConfig, strategy: MatchStrategy) -> Self {
        Self { side, strategy }
    }

    fn key(&self, record: &Record) -> Vec<String> {
        let match_value = match (self.strategy, self.side.line_id.as_deref()) {
            (MatchStrategy::ExactKey, Some(field)) => self.side.line_key(&record.get(field).as_text()),
            _ => record.get(&self.side.entity).as_text(),
        };
        let mut key = vec![match_value, record.get(&self.side.currency).as_text()];
        key.extend(self.side.group_by.iter().map(|f| record.get(f).as_text()));
        key
    }

    fn aggregate(&self, records: &[Record]) -> Result<Vec<AggregateRow>, ReconError> {
        aggregate_by(records, |r| self.key(r), &self.side.numeric_fields())
    }

    fn project(&self, row: &AggregateRow, records: &[Record]) -> Result<SideGroup, ReconError> {
        let match_value = row.key.first().cloned().unwrap_or_default();
        let entity = match self.strategy {
            MatchStrategy::FuzzyEntity => match_value.clone(),
            MatchStrategy::ExactKey => row
                .record_indices
                .first()
                .map(|&i| records[i].get(&self.side.entity).as_text())
                .unwrap_or_default(),
        };
        let mut total = Decimal::ZERO;
        for field in &self.side.amount {
            total = checked_add(total, row.sum(field), &format!("summing amounts of '{match_value}'"))?;
        }
        Ok(SideGroup {
            match_value,
            entity,
            currency: row.key.get(1).cloned().unwrap_or_default(),
            extra: self
                .side
                .group_by
                .iter()
                .cloned()
                .zip(row.key.iter().skip(2).cloned())
                .collect(),
            quantity: self.side.quantity.as_deref().map(|q| row.sum(q)),
            total,
            fee: self.side.fee.as_deref().map(|f| row.sum(f)),
            record_count: row.record_indices.len(),
        })
    }
}

/// Load a CSV export into a table of text cells. Empty cells become
/// `Value::Null`; a leading byte-order mark on the header is dropped.
pub fn load_csv_table(name: &str, csv_data: &str) -> Result<Table, ReconError> {
    let csv_err = |e: csv::Error| ReconError::Csv {
        table: name.into(),
        message: e.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_data.trim_start_matches('\u{feff}').as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let fields = columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let value = match record.get(i) {
                    Some(v) if !v.is_empty() => Value::Text(v.to_string()),
                    _ => Value::Null,
                };
                (col.clone(), value)
            })
            .collect();
        records.push(Record::new(fields));
    }

    Ok(Table::new(name, columns, records))
}
