//! Reporting-period resolution for `--month` / `--previous-month`.

use chrono::{Datelike, NaiveDate};
use royalty_recon::model::Period;

/// Parse `YYYY-MM` into the half-open window covering that month.
pub fn month(value: &str) -> Result<Period, String> {
    let start = NaiveDate::parse_from_str(&format!("{}-01", value.trim()), "%Y-%m-%d")
        .map_err(|_| format!("invalid month '{value}' (expected YYYY-MM)"))?;
    Ok(Period {
        start,
        end: first_of_next_month(start),
    })
}

/// The calendar month before the one containing `today`.
pub fn previous_month(today: NaiveDate) -> Period {
    let this_month = first_of_month(today);
    let start = match this_month.month() {
        1 => NaiveDate::from_ymd_opt(this_month.year() - 1, 12, 1),
        m => NaiveDate::from_ymd_opt(this_month.year(), m - 1, 1),
    }
    .unwrap_or(this_month);
    Period {
        start,
        end: this_month,
    }
}

fn first_of_month(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

fn first_of_next_month(d: NaiveDate) -> NaiveDate {
    let next = match d.month() {
        12 => NaiveDate::from_ymd_opt(d.year() + 1, 1, 1),
        m => NaiveDate::from_ymd_opt(d.year(), m + 1, 1),
    };
    next.unwrap_or(NaiveDate::MAX)
}
