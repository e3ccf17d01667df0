use crate::error::{FeeError, FeeResult};
use crate::model::{AcademicYear, ACADEMIC_YEAR_COLUMNS};
use chrono::{Datelike, NaiveDate};
use rusqlite::{Connection, OptionalExtension};

/// Resolves the academic year flagged as current.
///
/// Callers resolve this once and hand the value to the batch jobs, so a job
/// never re-reads the flag mid-run.
pub fn current_academic_year(conn: &Connection) -> FeeResult<AcademicYear> {
    let sql = format!(
        "SELECT {} FROM academic_years WHERE is_current = 1",
        ACADEMIC_YEAR_COLUMNS
    );
    conn.query_row(&sql, [], AcademicYear::from_row)
        .optional()?
        .ok_or(FeeError::NoActiveAcademicYear)
}

/// Fills in a missing month or year from `today` and validates the month.
pub fn target_period(month: Option<u32>, year: Option<i32>, today: NaiveDate) -> FeeResult<(u32, i32)> {
    let month = month.unwrap_or_else(|| today.month());
    let year = year.unwrap_or_else(|| today.year());
    if !(1..=12).contains(&month) {
        return Err(FeeError::InvalidPeriod(format!(
            "month must be between 1 and 12 (got {})",
            month
        )));
    }
    if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
        return Err(FeeError::InvalidPeriod(format!("year {} is out of range", year)));
    }
    Ok((month, year))
}

/// First day of the billing month.
pub fn period_start(month: u32, year: i32) -> FeeResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| FeeError::InvalidPeriod(format!("{}-{:02}", year, month)))
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Due date for a billing month. A due day past the end of the month lands
/// on the month's last day.
pub fn due_date(year: i32, month: u32, due_day: Option<u32>, default_day: u32) -> FeeResult<NaiveDate> {
    let day = due_day.unwrap_or(default_day).max(1);
    let day = day.min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| FeeError::InvalidPeriod(format!("{}-{:02}-{:02}", year, month, day)))
}
