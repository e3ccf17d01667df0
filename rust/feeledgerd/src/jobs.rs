//! Entry points shared by the CLI subcommands and the sidecar methods.

use crate::error::FeeResult;
use crate::generate::{self, GenerationReport};
use crate::overdue::{self, SweepReport};
use crate::period;
use crate::settings;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;

/// Resolves the current academic year and target period, then generates.
/// Fails before any write when no year is current or the period is invalid.
/// Unreadable stored settings are replaced by the defaults.
pub fn generate_monthly_fees(
    conn: &Connection,
    month: Option<u32>,
    year: Option<i32>,
    now: NaiveDateTime,
) -> FeeResult<GenerationReport> {
    let academic_year = period::current_academic_year(conn)?;
    let (month, year) = period::target_period(month, year, now.date())?;
    let settings = settings::load_or_default(conn);
    tracing::info!(
        academic_year = %academic_year.name,
        month,
        year,
        "generating monthly fees"
    );
    generate::generate(conn, &academic_year, month, year, now, &settings)
}

pub fn update_overdue_fees(conn: &Connection, as_of: NaiveDate) -> FeeResult<SweepReport> {
    let settings = settings::load_or_default(conn);
    tracing::info!(as_of = %as_of, reassess = settings.reassess_overdue, "sweeping overdue fees");
    overdue::sweep_overdue(conn, as_of, &settings)
}
