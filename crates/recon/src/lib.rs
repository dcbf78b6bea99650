//! `royalty-recon`: fuzzy entity reconciliation and variance engine.
//!
//! Pure engine crate: receives pre-loaded tables, returns a variance report
//! with adjusted totals. No CLI or filesystem dependencies.

pub mod aggregate;
pub mod blocking;
pub mod config;
pub mod engine;
pub mod error;
pub mod fx;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod overrides;
pub mod rollup;
pub mod schema;
pub mod similarity;
pub mod summary;
pub mod variance;

pub use config::ReconConfig;
pub use engine::{load_csv_table, run};
pub use error::ReconError;
pub use model::{ReconInput, ReconReport, RollupRow, VarianceRow};
pub use normalize::Normalizer;
pub use similarity::token_set_ratio;
