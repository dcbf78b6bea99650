//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scheduled month-end jobs
//! branch on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                                      |
//! |---------|-----------|--------------------------------------------------|
//! | 0       | Universal | Success, every group matched with no variance    |
//! | 1       | recon     | Report produced; variances or unmatched groups   |
//! | 2       | Universal | CLI usage error (bad args, missing input path)   |
//! | 3-9     | recon     | Run aborted before a report was produced         |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `recon_exit_code` or the command's error handling

use royalty_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - report produced and clean.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, no input path for a side.
/// Matches clap's own exit code for argument errors.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Recon (1, 3-9)
// =============================================================================

/// Report produced, but at least one group is unmatched, has a currency
/// mismatch, or carries a non-zero adjusted difference.
/// Like `diff(1)`, exit 1 means "ledgers differ."
pub const EXIT_RECON_VARIANCE: u8 = 1;

/// Config could not be parsed or failed validation.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 3;

/// Input tables lack fields the config binds.
pub const EXIT_RECON_SCHEMA: u8 = 4;

/// Runtime failure: unreadable file, malformed CSV, missing FX rate,
/// decimal overflow, output write error.
pub const EXIT_RECON_RUNTIME: u8 = 5;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_RECON_INVALID_CONFIG,
        ReconError::Schema { .. } => EXIT_RECON_SCHEMA,
        ReconError::MissingFxRate { .. } | ReconError::Csv { .. } | ReconError::Overflow { .. } => {
            EXIT_RECON_RUNTIME
        }
    }
}
