use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use royalty_recon::config::ReconConfig;
use royalty_recon::engine::{load_csv_table, run};
use royalty_recon::model::{MatchStatus, Period, ReconInput, ReconReport, VarianceRow};
use royalty_recon::ReconError;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn read_table(name: &str, file: Option<&String>) -> royalty_recon::model::Table {
    let file = file.unwrap_or_else(|| panic!("{name} has no file"));
    let path = fixtures_dir().join(file);
    let csv_data = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    load_csv_table(name, &csv_data).unwrap()
}

fn load_input(config: &ReconConfig, period: Option<Period>) -> ReconInput {
    ReconInput {
        external: read_table("external", config.external.file.as_ref()),
        internal: read_table("internal", config.internal.file.as_ref()),
        auxiliary: config
            .auxiliary
            .as_ref()
            .map(|aux| read_table("auxiliary", aux.file.as_ref())),
        period,
    }
}

fn load_config(name: &str) -> ReconConfig {
    let toml = std::fs::read_to_string(fixtures_dir().join(name)).unwrap();
    ReconConfig::from_toml(&toml).unwrap()
}

fn january() -> Period {
    Period {
        start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
    }
}

fn load_and_run(name: &str, period: Option<Period>) -> ReconReport {
    let config = load_config(name);
    let input = load_input(&config, period);
    run(&config, &input).unwrap()
}

fn row<'a>(report: &'a ReconReport, entity: &str) -> &'a VarianceRow {
    report
        .rows
        .iter()
        .find(|r| r.external_entity == entity)
        .unwrap_or_else(|| panic!("no row for {entity}"))
}

// -------------------------------------------------------------------------
// Fuzzy entity reconciliation
// -------------------------------------------------------------------------

#[test]
fn vaultn_summary() {
    let report = load_and_run("vaultn.recon.toml", Some(january()));

    assert_eq!(report.meta.config_name, "VaultN monthly");
    assert_eq!(report.meta.strategy, "fuzzy_entity");
    assert_eq!(report.meta.threshold, 90);
    assert_eq!(report.summary.total_groups, 6);
    assert_eq!(report.summary.matched, 5);
    assert_eq!(report.summary.unmatched, 1);
    assert_eq!(report.summary.currency_mismatches, 0);
    assert_eq!(report.summary.with_variance, 2);
    assert_eq!(report.summary.adjusted_groups, 1);
    assert_eq!(report.summary.adjusted_lines, 1);
    assert!(!report.summary.is_clean());

    assert_eq!(report.quality.dropped_non_positive, 1);
    assert_eq!(report.quality.out_of_period.get("external"), Some(&1));
    assert_eq!(report.quality.parse_failures, 1);
    assert_eq!(report.quality.issues[0].row, 12);
    assert_eq!(report.quality.issues[0].value, "oops");
}

#[test]
fn vaultn_rows_in_group_key_order() {
    let report = load_and_run("vaultn.recon.toml", Some(january()));
    let entities: Vec<&str> = report.rows.iter().map(|r| r.external_entity.as_str()).collect();
    assert_eq!(
        entities,
        vec!["Acme & Co Ltd", "Bethesda Softworks", "Nordic Oy", "Orphan Studio", "THUNDERFUL", "Zero Games Ltd"]
    );
}

#[test]
fn vaultn_normalized_match_and_difference() {
    let report = load_and_run("vaultn.recon.toml", Some(january()));

    let acme = row(&report, "Acme & Co Ltd");
    assert_eq!(acme.status, MatchStatus::Matched);
    assert_eq!(acme.internal_entity.as_deref(), Some("ACME AND COMPANY"));
    assert_eq!(acme.match_score, 100);
    // February line is outside the period
    assert_eq!(acme.external_total, dec("100.00"));
    assert_eq!(acme.difference, dec("10.00"));
    assert_eq!(acme.percentage_difference.unwrap().round_dp(2), dec("11.11"));
    assert_eq!(acme.currency_match, Some(true));

    let nordic = row(&report, "Nordic Oy");
    assert_eq!(nordic.internal_entity.as_deref(), Some("Nordic OY"));
    assert_eq!(nordic.external_total, dec("1200.00"));
    assert_eq!(nordic.quantity, Some(dec("2")));
    assert_eq!(nordic.difference, Decimal::ZERO);
}

#[test]
fn vaultn_alias_merges_groups() {
    let report = load_and_run("vaultn.recon.toml", Some(january()));
    let thunderful = row(&report, "THUNDERFUL");
    assert_eq!(thunderful.external_total, dec("45.00"));
    assert_eq!(thunderful.internal_entity.as_deref(), Some("Thunderful AB"));
    assert_eq!(thunderful.difference, Decimal::ZERO);
}

#[test]
fn vaultn_unmatched_and_zero_denominator() {
    let report = load_and_run("vaultn.recon.toml", Some(january()));

    let orphan = row(&report, "Orphan Studio");
    assert_eq!(orphan.status, MatchStatus::Unmatched);
    assert_eq!(orphan.match_score, 0);
    assert_eq!(orphan.internal_entity, None);
    assert_eq!(orphan.internal_total, None);
    assert_eq!(orphan.currency_match, None);
    assert_eq!(orphan.difference, dec("12.50"));

    let zero = row(&report, "Zero Games Ltd");
    assert_eq!(zero.internal_total, Some(Decimal::ZERO));
    assert_eq!(zero.difference, dec("50.00"));
    assert_eq!(zero.percentage_difference, None);
}

#[test]
fn vaultn_bethesda_adjustment() {
    let report = load_and_run("vaultn.recon.toml", Some(january()));

    let bethesda = row(&report, "Bethesda Softworks");
    assert_eq!(bethesda.internal_entity.as_deref(), Some("Bethesda Softworks LLC"));
    assert_eq!(bethesda.external_total, dec("26.00"));
    assert_eq!(bethesda.difference, dec("-3.50"));
    assert_eq!(bethesda.adjusted_total, Some(dec("29.50")));
    assert_eq!(bethesda.adjusted_difference, Decimal::ZERO);

    // every Bethesda line is in the detail; only V002 was replaced
    let lines: Vec<(&str, bool)> = report
        .adjustments
        .iter()
        .map(|a| (a.line_id.as_str(), a.adjusted))
        .collect();
    assert_eq!(lines, vec![("V002", true), ("V003", false), ("V004", false)]);

    let v002 = &report.adjustments[0];
    assert_eq!(v002.rule, "bethesda_promo");
    assert_eq!(v002.row, 1);
    assert_eq!(v002.status, "Adjusted");
    assert_eq!(v002.promotion.as_deref(), Some("Winter Sale"));
    assert_eq!(v002.before, Some(dec("8.00")));
    assert_eq!(v002.after, Some(dec("11.50")));

    // other groups carry no adjusted total
    let acme = row(&report, "Acme & Co Ltd");
    assert_eq!(acme.adjusted_total, None);
    assert_eq!(acme.adjusted_difference, acme.difference);
}

#[test]
fn vaultn_without_period_keeps_every_row() {
    let report = load_and_run("vaultn.recon.toml", None);
    assert!(report.quality.out_of_period.is_empty());
    assert_eq!(row(&report, "Acme & Co Ltd").external_total, dec("1099.00"));
}

#[test]
fn vaultn_threshold_100_still_matches_exact_keys() {
    let mut config = load_config("vaultn.recon.toml");
    config.matching.threshold = 100;
    let input = load_input(&config, Some(january()));
    let report = run(&config, &input).unwrap();
    assert_eq!(report.summary.matched, 5);
}

#[test]
fn vaultn_is_deterministic() {
    let a = serde_json::to_string(&load_and_run("vaultn.recon.toml", Some(january()))).unwrap();
    let b = serde_json::to_string(&load_and_run("vaultn.recon.toml", Some(january()))).unwrap();
    assert_eq!(a, b);
}

#[test]
fn missing_auxiliary_table_is_schema_error() {
    let config = load_config("vaultn.recon.toml");
    let mut input = load_input(&config, None);
    input.auxiliary = None;
    let err = run(&config, &input).unwrap_err();
    assert!(matches!(err, ReconError::Schema { ref missing } if missing.len() == 3));
}

// -------------------------------------------------------------------------
// Line-level reconciliation with FX
// -------------------------------------------------------------------------

#[test]
fn genba_exact_key_with_fx() {
    let report = load_and_run("genba.recon.toml", None);

    assert_eq!(report.meta.strategy, "exact_key");
    assert_eq!(report.meta.reporting_currency.as_deref(), Some("EUR"));
    assert_eq!(report.quality.dropped_non_positive, 1);
    assert_eq!(report.summary.total_groups, 3);
    assert_eq!(report.summary.matched, 3);
    assert_eq!(report.summary.with_variance, 1);

    let ids: Vec<&str> = report.rows.iter().filter_map(|r| r.line_id.as_deref()).collect();
    assert_eq!(ids, vec!["5001", "5002", "5003"]);

    let sega_eur = &report.rows[0];
    assert_eq!(sega_eur.external_total, dec("21.00"));
    assert_eq!(sega_eur.converted_total, Some(dec("21.00")));
    assert_eq!(sega_eur.difference, Decimal::ZERO);

    let sega_usd = &report.rows[1];
    assert_eq!(sega_usd.currency, "USD");
    assert_eq!(sega_usd.converted_total, Some(dec("18.00")));
    assert_eq!(sega_usd.currency_match, Some(true));
    assert_eq!(sega_usd.difference, Decimal::ZERO);

    let team17 = &report.rows[2];
    assert_eq!(team17.external_entity, "Team17");
    assert_eq!(team17.internal_entity.as_deref(), Some("Team17 Digital"));
    assert_eq!(team17.converted_total, Some(dec("9.20")));
    assert_eq!(team17.difference, dec("0.20"));
    assert_eq!(team17.extra["Product Title"], "Worms Rumble");
}

#[test]
fn genba_fee_adjusted_difference_and_discount() {
    let report = load_and_run("genba.recon.toml", None);

    let fees: Vec<Option<Decimal>> = report.rows.iter().map(|r| r.internal_fee).collect();
    assert_eq!(fees, vec![Some(dec("0.40")), Some(Decimal::ZERO), Some(dec("0.05"))]);

    let fee_adjusted: Vec<Option<Decimal>> = report.rows.iter().map(|r| r.fee_adjusted_difference).collect();
    assert_eq!(fee_adjusted, vec![Some(dec("-0.40")), Some(Decimal::ZERO), Some(dec("0.15"))]);

    // the plain difference still drives the variance count
    assert_eq!(report.summary.with_variance, 1);

    assert_eq!(report.rows[0].missing_discount, Some(Decimal::ZERO));
    assert_eq!(report.rows[2].missing_discount.unwrap().round_dp(4), dec("0.0217"));
}

#[test]
fn genba_rollup_by_product_title() {
    let report = load_and_run("genba.recon.toml", None);

    let rollup: Vec<(&str, usize, Decimal)> = report
        .rollup
        .iter()
        .map(|r| (r.key.as_str(), r.groups, r.total_difference))
        .collect();
    // the dropped zero-unit line never reaches the rollup
    assert_eq!(
        rollup,
        vec![("Worms Rumble", 1, dec("0.15")), ("Sonic Frontiers", 2, dec("-0.40"))]
    );
}

#[test]
fn genba_without_fee_binding_rolls_up_adjusted_difference() {
    let toml = std::fs::read_to_string(fixtures_dir().join("genba.recon.toml"))
        .unwrap()
        .replace("fee = \"allowable_transaction_fee\"\n", "");
    let config = ReconConfig::from_toml(&toml).unwrap();
    let report = run(&config, &load_input(&config, None)).unwrap();

    assert!(report.rows.iter().all(|r| r.fee_adjusted_difference.is_none() && r.internal_fee.is_none()));
    assert_eq!(report.rollup[0].key, "Worms Rumble");
    assert_eq!(report.rollup[0].total_difference, dec("0.20"));
    assert_eq!(report.rollup[1].total_difference, Decimal::ZERO);
}

#[test]
fn genba_missing_rate_fails() {
    let toml = std::fs::read_to_string(fixtures_dir().join("genba.recon.toml"))
        .unwrap()
        .replace("GBP = \"1.15\"", "");
    let config = ReconConfig::from_toml(&toml).unwrap();
    let input = load_input(&config, None);
    let err = run(&config, &input).unwrap_err();
    assert_eq!(err.to_string(), "no FX rate configured for currency 'GBP'");
}
