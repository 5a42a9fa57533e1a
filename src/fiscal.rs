//! Fiscal calendar arithmetic and the fiscal-context prompt block.
//!
//! The fiscal year runs November 1 through October 31: FY2025 starts
//! Nov 1, 2024. [`current_period`] maps any calendar date to exactly one
//! (fiscal year, quarter) pair, [`quarter_dates`] gives the inclusive date
//! range of a quarter, and [`fiscal_statement`] renders the deterministic
//! "Fiscal Period Context" block used as a global prompt.
//!
//! # Example
//!
//! ```rust
//! use aegis::fiscal::{current_period, quarter_dates, Quarter};
//! use chrono::NaiveDate;
//!
//! let d = NaiveDate::from_ymd_opt(2024, 11, 15).unwrap();
//! assert_eq!(current_period(d), (2025, Quarter::Q1));
//!
//! let (start, end) = quarter_dates(2025, Quarter::Q2);
//! assert_eq!(start, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
//! assert_eq!(end, NaiveDate::from_ymd_opt(2025, 4, 30).unwrap());
//! ```

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// First month of the fiscal year (November).
const FISCAL_START_MONTH: u32 = 11;

/// Fiscal quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quarter {
    /// November through January.
    Q1,
    /// February through April.
    Q2,
    /// May through July.
    Q3,
    /// August through October.
    Q4,
}

impl Quarter {
    /// Quarter number, 1 through 4.
    pub fn number(&self) -> u32 {
        match self {
            Quarter::Q1 => 1,
            Quarter::Q2 => 2,
            Quarter::Q3 => 3,
            Quarter::Q4 => 4,
        }
    }

    /// Quarter from its number (1-4).
    pub fn from_number(n: u32) -> Option<Self> {
        match n {
            1 => Some(Quarter::Q1),
            2 => Some(Quarter::Q2),
            3 => Some(Quarter::Q3),
            4 => Some(Quarter::Q4),
            _ => None,
        }
    }

    /// Parse the wire form (`Q1` … `Q4`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "Q1" => Some(Quarter::Q1),
            "Q2" => Some(Quarter::Q2),
            "Q3" => Some(Quarter::Q3),
            "Q4" => Some(Quarter::Q4),
            _ => None,
        }
    }

    /// Month-range label used in the fiscal statement.
    fn month_label(&self) -> &'static str {
        match self {
            Quarter::Q1 => "Q1 (Nov-Jan)",
            Quarter::Q2 => "Q2 (Feb-Apr)",
            Quarter::Q3 => "Q3 (May-Jul)",
            Quarter::Q4 => "Q4 (Aug-Oct)",
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.number())
    }
}

/// Inclusive start and end dates of a fiscal quarter.
///
/// Q1 of FY2025 is Nov 1, 2024 through Jan 31, 2025; Q4 ends Oct 31 of the
/// fiscal year. End dates carry end-of-month semantics.
pub fn quarter_dates(fiscal_year: i32, quarter: Quarter) -> (NaiveDate, NaiveDate) {
    let quarter_start_month = FISCAL_START_MONTH + (quarter.number() - 1) * 3;
    let (start_month, start_year) = if quarter_start_month > 12 {
        (quarter_start_month - 12, fiscal_year)
    } else {
        (quarter_start_month, fiscal_year - 1)
    };

    // Both are in-range by construction.
    let start = NaiveDate::from_ymd_opt(start_year, start_month, 1)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(start_year, 1, 1).unwrap_or_default());

    let end_month_raw = start_month + 2;
    let (end_month, end_year) = if end_month_raw > 12 {
        (end_month_raw - 12, start_year + 1)
    } else {
        (end_month_raw, start_year)
    };
    let end = last_day_of_month(end_year, end_month);

    (start, end)
}

/// Map a calendar date to its (fiscal year, quarter).
///
/// Oct 31 belongs to Q4 of the closing fiscal year; Nov 1 opens Q1 of the
/// next one.
pub fn current_period(date: NaiveDate) -> (i32, Quarter) {
    let (fiscal_year, months_elapsed) = if date.month() >= FISCAL_START_MONTH {
        (date.year() + 1, date.month() - FISCAL_START_MONTH)
    } else {
        (date.year(), (12 - FISCAL_START_MONTH) + date.month())
    };
    let quarter = Quarter::from_number(months_elapsed / 3 + 1).unwrap_or(Quarter::Q4);
    (fiscal_year, quarter)
}

/// Render the deterministic fiscal-context block for a date.
///
/// This is the text served by the `fiscal_context` global prompt. The block
/// names the current fiscal year and quarter, the current quarter's period
/// with inclusive day counts, all four quarter ranges, and the YTD/QTD
/// reference guidelines.
pub fn fiscal_statement(date: NaiveDate) -> String {
    let (fiscal_year, quarter) = current_period(date);
    let fy_start = NaiveDate::from_ymd_opt(fiscal_year - 1, 11, 1).unwrap_or_default();
    let (quarter_start, quarter_end) = quarter_dates(fiscal_year, quarter);

    let days_remaining = (quarter_end - date).num_days() + 1;
    let days_elapsed = (date - quarter_start).num_days() + 1;

    let quarters_info: Vec<String> = (1..=4)
        .filter_map(Quarter::from_number)
        .map(|q| {
            let (s, e) = quarter_dates(fiscal_year, q);
            format!(
                "  - {}: {} to {}",
                q.month_label(),
                s.format("%b %d, %Y"),
                e.format("%b %d, %Y")
            )
        })
        .collect();

    format!(
        "Fiscal Period Context:\n\
         \n\
         Today's Date: {today}\n\
         Current Fiscal Year: FY{fy} (Nov 1, {fy_prev} - Oct 31, {fy})\n\
         Current Fiscal Quarter: FY{fy} {q}\n\
         \n\
         Current Quarter:\n\
         \x20 - Period: {q_start} to {q_end}\n\
         \x20 - Days Remaining: {remaining}\n\
         \x20 - Days Elapsed: {elapsed}\n\
         \n\
         Fiscal Year Quarters:\n\
         {quarters}\n\
         \n\
         Date Reference Guidelines:\n\
         \x20 - Year-to-date (YTD): From {fy_start} to today\n\
         \x20 - Quarter-to-date (QTD): From {q_start} to today\n\
         \x20 - Prior year comparison: FY{fy_minus1} (Nov 1, {fy_minus2} - Oct 31, {fy_minus1})\n\
         \x20 - Use current fiscal period unless specifically requested otherwise",
        today = date.format("%B %d, %Y"),
        fy = fiscal_year,
        fy_prev = fiscal_year - 1,
        q = quarter,
        q_start = quarter_start.format("%B %d, %Y"),
        q_end = quarter_end.format("%B %d, %Y"),
        remaining = days_remaining,
        elapsed = days_elapsed,
        quarters = quarters_info.join("\n"),
        fy_start = fy_start.format("%B %d, %Y"),
        fy_minus1 = fiscal_year - 1,
        fy_minus2 = fiscal_year - 2,
    )
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or_default()
}
