use rust_decimal::Decimal;

use crate::config::FxConfig;
use crate::error::ReconError;

/// Decimal places kept after conversion into the reporting currency.
pub const CONVERTED_DP: u32 = 2;

impl FxConfig {
    /// Rate into the reporting currency. The reporting currency itself is
    /// always 1 even when the table omits it.
    pub fn rate(&self, currency: &str) -> Result<Decimal, ReconError> {
        let code = currency.trim().to_ascii_uppercase();
        if code == self.reporting_currency.trim().to_ascii_uppercase() {
            return Ok(Decimal::ONE);
        }
        self.rates
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(&code))
            .map(|(_, r)| *r)
            .ok_or(ReconError::MissingFxRate { currency: code })
    }

    /// Convert and round to 2 dp (banker's rounding).
    pub fn convert(&self, amount: Decimal, currency: &str) -> Result<Decimal, ReconError> {
        let rate = self.rate(currency)?;
        amount
            .checked_mul(rate)
            .map(|v| v.round_dp(CONVERTED_DP))
            .ok_or_else(|| ReconError::overflow(format!("converting {amount} {currency} at rate {rate}")))
    }
}
