//! `royalty-recon run | validate | score`

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;
use tracing::info;

use royalty_recon::config::ReconConfig;
use royalty_recon::model::{ReconInput, Table};
use royalty_recon::{load_csv_table, token_set_ratio, Normalizer};

use crate::exit_codes::{EXIT_RECON_RUNTIME, EXIT_RECON_VARIANCE};
use crate::output::{
    write_adjusted_csv, write_rollup_csv, write_variance_csv, ADJUSTED_FILE, ROLLUP_FILE, VARIANCE_FILE,
};
use crate::period;
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Run reconciliation from a TOML config file
    #[command(after_help = "\
Examples:
  royalty-recon run vaultn.recon.toml --month 2025-01
  royalty-recon run vaultn.recon.toml --previous-month --csv-dir out/
  royalty-recon run genba.recon.toml --external report.csv --json
  royalty-recon run genba.recon.toml --output result.json

Exit codes:
  0  every group matched with no variance
  1  variances, currency mismatches or unmatched groups
  3  invalid config   4  missing fields   5  runtime error")]
    Run {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// External (partner) report CSV; overrides `external.file`
        #[arg(long)]
        external: Option<PathBuf>,

        /// Internal ledger CSV; overrides `internal.file`
        #[arg(long)]
        internal: Option<PathBuf>,

        /// Auxiliary (promotion) table CSV; overrides `auxiliary.file`
        #[arg(long)]
        auxiliary: Option<PathBuf>,

        /// Reporting month, YYYY-MM
        #[arg(long, conflicts_with = "previous_month")]
        month: Option<String>,

        /// Use the calendar month before today
        #[arg(long)]
        previous_month: bool,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write variance_report.csv, adjusted_detail.csv and (with rollup_by)
        /// rollup_report.csv into this directory
        #[arg(long)]
        csv_dir: Option<PathBuf>,
    },

    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  royalty-recon validate vaultn.recon.toml")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },

    /// Show canonical keys and the similarity score for two entity names
    #[command(after_help = "\
Examples:
  royalty-recon score \"Acme & Co Ltd\" \"ACME AND COMPANY\"
  royalty-recon score \"Sega Europe\" \"SEGA\" --config vaultn.recon.toml")]
    Score {
        a: String,
        b: String,

        /// Use this config's legal-suffix vocabulary
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run {
            config,
            external,
            internal,
            auxiliary,
            month,
            previous_month,
            json,
            output,
            csv_dir,
        } => cmd_recon_run(RunArgs {
            config_path: config,
            external,
            internal,
            auxiliary,
            month,
            previous_month,
            json_output: json,
            output_file: output,
            csv_dir,
        }),
        ReconCommands::Validate { config } => cmd_recon_validate(config),
        ReconCommands::Score { a, b, config, json } => cmd_recon_score(a, b, config, json),
    }
}

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError::new(code, msg)
}

fn load_config(config_path: &Path) -> Result<ReconConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot read config: {e}")))?;
    ReconConfig::from_toml(&config_str).map_err(CliError::recon)
}

struct RunArgs {
    config_path: PathBuf,
    external: Option<PathBuf>,
    internal: Option<PathBuf>,
    auxiliary: Option<PathBuf>,
    month: Option<String>,
    previous_month: bool,
    json_output: bool,
    output_file: Option<PathBuf>,
    csv_dir: Option<PathBuf>,
}

/// Flag path as given, else the config's `file` relative to the config's directory.
fn resolve_path(
    base_dir: &Path,
    flag: Option<PathBuf>,
    configured: Option<&String>,
    table: &str,
) -> Result<PathBuf, CliError> {
    flag.or_else(|| configured.map(|f| base_dir.join(f))).ok_or_else(|| {
        CliError::args(format!("no input file for the {table} table"))
            .with_hint(format!("pass --{table} <csv> or set {table}.file in the config"))
    })
}

fn read_table(name: &str, path: &Path) -> Result<Table, CliError> {
    let csv_data = std::fs::read_to_string(path).map_err(|e| {
        recon_err(EXIT_RECON_RUNTIME, format!("cannot read {}: {e}", path.display()))
    })?;
    let table = load_csv_table(name, &csv_data).map_err(CliError::recon)?;
    info!(table = name, path = %path.display(), rows = table.records.len(), "loaded table");
    Ok(table)
}

fn cmd_recon_run(args: RunArgs) -> Result<(), CliError> {
    let config = load_config(&args.config_path)?;

    // Resolve file paths relative to config file's directory
    let base_dir = args.config_path.parent().unwrap_or_else(|| Path::new("."));

    let external_path = resolve_path(base_dir, args.external, config.external.file.as_ref(), "external")?;
    let internal_path = resolve_path(base_dir, args.internal, config.internal.file.as_ref(), "internal")?;
    let auxiliary_path = match &config.auxiliary {
        // without rules the auxiliary table is never read
        Some(aux) if !config.overrides.is_empty() => {
            Some(resolve_path(base_dir, args.auxiliary, aux.file.as_ref(), "auxiliary")?)
        }
        _ => None,
    };

    let period = match (args.month, args.previous_month) {
        (Some(m), _) => Some(period::month(&m).map_err(CliError::args)?),
        (None, true) => Some(period::previous_month(chrono::Local::now().date_naive())),
        (None, false) => None,
    };

    let input = ReconInput {
        external: read_table("external", &external_path)?,
        internal: read_table("internal", &internal_path)?,
        auxiliary: auxiliary_path
            .map(|p| read_table("auxiliary", &p))
            .transpose()?,
        period,
    };

    // Run engine
    let result = royalty_recon::run(&config, &input).map_err(CliError::recon)?;

    // Output
    if let Some(ref dir) = args.csv_dir {
        std::fs::create_dir_all(dir).map_err(|e| {
            recon_err(EXIT_RECON_RUNTIME, format!("cannot create {}: {e}", dir.display()))
        })?;
        let variance_path = dir.join(VARIANCE_FILE);
        write_variance_csv(&variance_path, &result)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write {}: {e}", variance_path.display())))?;
        let adjusted_path = dir.join(ADJUSTED_FILE);
        write_adjusted_csv(&adjusted_path, &result.adjustments)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write {}: {e}", adjusted_path.display())))?;
        eprintln!("wrote {} and {}", variance_path.display(), adjusted_path.display());
        if let Some(ref field) = result.meta.rollup_by {
            let rollup_path = dir.join(ROLLUP_FILE);
            write_rollup_csv(&rollup_path, field, &result.rollup)
                .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write {}: {e}", rollup_path.display())))?;
            eprintln!("wrote {}", rollup_path.display());
        }
    }

    if args.json_output || args.output_file.is_some() {
        let json_str = serde_json::to_string_pretty(&result)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("JSON serialization error: {e}")))?;

        if let Some(ref path) = args.output_file {
            std::fs::write(path, &json_str)
                .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write output: {e}")))?;
            eprintln!("wrote {}", path.display());
        }

        if args.json_output {
            println!("{json_str}");
        }
    }

    // Human summary to stderr
    let s = &result.summary;
    eprintln!(
        "{} recon: {} groups, {} matched, {} unmatched, {} currency mismatches, {} with variance, {} adjusted",
        result.meta.strategy,
        s.total_groups,
        s.matched,
        s.unmatched,
        s.currency_mismatches,
        s.with_variance,
        s.adjusted_groups,
    );
    if result.quality.parse_failures > 0 {
        eprintln!(
            "data quality: {} unparseable cell(s) treated as blank",
            result.quality.parse_failures
        );
    }

    if !s.is_clean() {
        return Err(recon_err(EXIT_RECON_VARIANCE, "variances found"));
    }

    Ok(())
}

fn cmd_recon_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    eprintln!(
        "valid: {} recon '{}' with threshold {}, {} alias(es), {} override rule(s)",
        config.strategy,
        config.name,
        config.matching.threshold,
        config.aliases.len(),
        config.overrides.len(),
    );
    Ok(())
}

#[derive(Serialize)]
struct ScoreOutput {
    a: String,
    b: String,
    canonical_a: String,
    canonical_b: String,
    score: u8,
}

fn cmd_recon_score(a: String, b: String, config: Option<PathBuf>, json_output: bool) -> Result<(), CliError> {
    let normalizer = match config {
        Some(path) => Normalizer::new(&load_config(&path)?.normalize.suffixes),
        None => Normalizer::default(),
    };
    let canonical_a = normalizer.normalize(&a);
    let canonical_b = normalizer.normalize(&b);
    let score = token_set_ratio(&canonical_a, &canonical_b);

    if json_output {
        let out = ScoreOutput { a, b, canonical_a, canonical_b, score };
        let json_str = serde_json::to_string_pretty(&out)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    } else {
        println!("a:     {canonical_a}");
        println!("b:     {canonical_b}");
        println!("score: {score}");
    }
    Ok(())
}
