// Property-based tests for normalization, matching and aggregation.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::BTreeMap;

use proptest::prelude::*;
use rust_decimal::Decimal;

use royalty_recon::aggregate::aggregate;
use royalty_recon::blocking::BlockingIndex;
use royalty_recon::config::{BlockingConfig, BlockingKey, ReconConfig};
use royalty_recon::engine::{load_csv_table, run};
use royalty_recon::matcher::{full_scan_match, Matcher};
use royalty_recon::model::{ReconInput, Record, Value};
use royalty_recon::similarity::token_set_ratio;
use royalty_recon::Normalizer;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn config_64() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(64),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

const BASES: &[&str] = &[
    "Acme", "Bethesda Softworks", "Thunderful", "Team17 Digital", "Sega Europe", "Sega America",
    "Paradox Interactive", "Devolver", "The Acme", "Nordic Games", "Zeta", "Kalypso Media",
];

const SUFFIXES: &[&str] = &["", " Ltd", " Inc.", " GmbH", " & Co", " LLC", " Sp. z o.o.", " AB"];

/// Publisher-like name: a base, a legal suffix, random casing.
fn arb_name() -> impl Strategy<Value = String> {
    (
        prop::sample::select(BASES),
        prop::sample::select(SUFFIXES),
        any::<bool>(),
    )
        .prop_map(|(base, suffix, upper)| {
            let name = format!("{base}{suffix}");
            if upper {
                name.to_uppercase()
            } else {
                name
            }
        })
}

/// Arbitrary text, including non-ASCII and punctuation.
fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => arb_name(),
        2 => r"[A-Za-z0-9 &.,'-]{0,30}",
        1 => ".{0,30}",
    ]
}

fn arb_blocking() -> impl Strategy<Value = BlockingConfig> {
    (1usize..6, any::<bool>()).prop_map(|(prefix_len, first_token)| BlockingConfig {
        prefix_len,
        key: if first_token {
            BlockingKey::FirstToken
        } else {
            BlockingKey::Prefix
        },
    })
}

fn canonical(names: &[String]) -> Vec<String> {
    let n = Normalizer::default();
    names.iter().map(|s| n.normalize(s)).collect()
}

/// Amount with two decimal places.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..1_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

// ===========================================================================
// Normalization
// ===========================================================================

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn normalize_is_idempotent(s in arb_text()) {
        let n = Normalizer::default();
        let once = n.normalize(&s);
        prop_assert_eq!(n.normalize(&once), once.clone(), "input: {:?}", s);
    }

    #[test]
    fn normalize_output_alphabet(s in arb_text()) {
        let out = Normalizer::default().normalize(&s);
        prop_assert!(out.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' '));
        prop_assert!(!out.contains("  "));
        prop_assert_eq!(out.trim(), out.as_str());
    }

    #[test]
    fn token_set_ratio_bounds(a in arb_text(), b in arb_text()) {
        let n = Normalizer::default();
        let (a, b) = (n.normalize(&a), n.normalize(&b));
        let ab = token_set_ratio(&a, &b);
        prop_assert!(ab <= 100);
        prop_assert_eq!(ab, token_set_ratio(&b, &a));
        if !a.is_empty() {
            prop_assert_eq!(token_set_ratio(&a, &a), 100);
        }
    }
}

// ===========================================================================
// Matching
// ===========================================================================

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn threshold_monotonicity(
        left in prop::collection::vec(arb_name(), 1..12),
        right in prop::collection::vec(arb_name(), 1..12),
        blocking in arb_blocking(),
        t1 in 0u8..=100,
        t2 in 0u8..=100,
    ) {
        let (lo, hi) = (t1.min(t2), t1.max(t2));
        let (left, right) = (canonical(&left), canonical(&right));

        let low = Matcher::new(&right, &blocking, lo).match_all(&left);
        let high = Matcher::new(&right, &blocking, hi).match_all(&left);

        let count = |ms: &[royalty_recon::model::MatchResult]| ms.iter().filter(|m| m.is_matched()).count();
        prop_assert!(count(&high) <= count(&low));
        // every match kept at the higher threshold is the same pair at the lower
        for (h, l) in high.iter().zip(&low) {
            if h.is_matched() {
                prop_assert_eq!(h, l);
            }
        }
    }

    #[test]
    fn fallback_equals_full_scan(
        left in prop::collection::vec(arb_text(), 1..12),
        right in prop::collection::vec(arb_name(), 0..12),
        blocking in arb_blocking(),
        threshold in 0u8..=100,
    ) {
        let (left, right) = (canonical(&left), canonical(&right));
        let index = BlockingIndex::build(&right, &blocking);
        let matcher = Matcher::new(&right, &blocking, threshold);

        for (i, key) in left.iter().enumerate() {
            if index.candidates(key).is_fallback() {
                prop_assert_eq!(
                    matcher.best_match(i, key),
                    full_scan_match(i, key, &right, threshold),
                    "key: {:?}", key
                );
            }
        }
    }

    #[test]
    fn exact_canonical_match_always_wins(
        right in prop::collection::vec(arb_name(), 1..12),
        pick in any::<prop::sample::Index>(),
        extra in prop::sample::select(&["and", "holdings", "games", "digital"][..]),
        blocking in arb_blocking(),
        threshold in 0u8..=100,
    ) {
        let mut right = canonical(&right);
        let key = right[pick.index(right.len())].clone();
        prop_assume!(!key.is_empty());
        // a token superset also scores 100 and comes first in candidate order
        right.insert(0, format!("{key} {extra}"));

        let m = Matcher::new(&right, &blocking, threshold).best_match(0, &key);
        prop_assert!(m.is_matched());
        prop_assert_eq!(m.score, 100);
        prop_assert_eq!(&right[m.right.unwrap()], &key);
    }
}

// ===========================================================================
// Aggregation
// ===========================================================================

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn aggregation_conservation(
        rows in prop::collection::vec((0usize..4, arb_amount(), any::<bool>()), 0..40),
    ) {
        let records: Vec<Record> = rows
            .iter()
            .map(|(entity, amount, null)| {
                Record::new(BTreeMap::from([
                    ("entity".to_string(), Value::Text(format!("e{entity}"))),
                    (
                        "amount".to_string(),
                        if *null { Value::Null } else { Value::Number(*amount) },
                    ),
                ]))
            })
            .collect();

        let aggs = aggregate(&records, &["entity"], &["amount"]).unwrap();

        let mut grand = Decimal::ZERO;
        for agg in &aggs {
            let expected: Decimal = agg
                .record_indices
                .iter()
                .filter_map(|&i| records[i].get("amount").as_decimal())
                .sum();
            prop_assert_eq!(agg.sum("amount"), expected);
            grand += agg.sum("amount");
        }
        let total: Decimal = records.iter().filter_map(|r| r.get("amount").as_decimal()).sum();
        prop_assert_eq!(grand, total);

        let contributing: usize = aggs.iter().map(|a| a.record_indices.len()).sum();
        prop_assert_eq!(contributing, records.len());
    }
}

// ===========================================================================
// Full pipeline
// ===========================================================================

const PIPELINE: &str = r#"
name = "property"

[external]
entity = "publisher"
currency = "currency"
amount = ["amount"]

[internal]
entity = "supplier"
currency = "currency"
amount = ["royalties"]
"#;

fn csv(header: &str, rows: &[(String, &str, Decimal)]) -> String {
    let mut out = format!("{header}\n");
    for (name, currency, amount) in rows {
        out.push_str(&format!("\"{}\",{currency},{amount}\n", name.replace('"', "")));
    }
    out
}

proptest! {
    #![proptest_config(config_64())]

    #[test]
    fn pipeline_determinism(
        ext in prop::collection::vec((arb_name(), prop::sample::select(&["USD", "EUR"][..]), arb_amount()), 0..15),
        int in prop::collection::vec((arb_name(), prop::sample::select(&["USD", "EUR"][..]), arb_amount()), 0..15),
    ) {
        let config = ReconConfig::from_toml(PIPELINE).unwrap();
        let input = ReconInput {
            external: load_csv_table("external", &csv("publisher,currency,amount", &ext)).unwrap(),
            internal: load_csv_table("internal", &csv("supplier,currency,royalties", &int)).unwrap(),
            auxiliary: None,
            period: None,
        };

        let first = run(&config, &input).unwrap();
        let second = run(&config, &input).unwrap();
        prop_assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );

        // every external group is reported, matched or not
        prop_assert_eq!(first.summary.matched + first.summary.unmatched, first.rows.len());
        for row in &first.rows {
            if row.internal_total.is_none() {
                prop_assert!(row.percentage_difference.is_none());
            }
        }
    }
}
