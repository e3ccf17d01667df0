//! Monthly fee generation.
//!
//! One pending fee record per active student and monthly fee type for the
//! target month. Re-running for the same month only reports skips: the natural
//! key (student, fee type, month, year) is checked before insert and is also
//! a UNIQUE constraint, so a lost race degrades into a skip.

use crate::db::decimal_text;
use crate::error::FeeResult;
use crate::model::{AcademicYear, FeeFrequency, Student, StudentStatus, STUDENT_COLUMNS};
use crate::period;
use crate::settings::FeeSettings;
use crate::status::FeeStatus;
use crate::structure::{structures_for_class, StructureWithType};
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentError {
    pub student_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub month: u32,
    pub year: i32,
    pub academic_year_id: String,
    pub students: usize,
    pub generated: usize,
    pub skipped: usize,
    pub errors: Vec<StudentError>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct StudentOutcome {
    generated: usize,
    skipped: usize,
}

const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Generates fee records for `month`/`year` in `academic_year`.
///
/// `now` stamps `created_at` and drives receipt numbering. Only an invalid
/// period or a failure to list students aborts the run; anything that goes
/// wrong for one student is recorded in `errors` and the run moves on.
pub fn generate(
    conn: &Connection,
    academic_year: &AcademicYear,
    month: u32,
    year: i32,
    now: NaiveDateTime,
    settings: &FeeSettings,
) -> FeeResult<GenerationReport> {
    let period_start = period::period_start(month, year)?;
    let mut report = GenerationReport {
        month,
        year,
        academic_year_id: academic_year.id.clone(),
        ..Default::default()
    };

    if !academic_year.contains(period_start) {
        let msg = format!(
            "{}-{:02} is outside academic year {} ({} to {})",
            year, month, academic_year.name, academic_year.start_date, academic_year.end_date
        );
        tracing::warn!(academic_year = %academic_year.id, "{}", msg);
        report.warnings.push(msg);
    }

    let students = active_students(conn, &academic_year.id)?;
    report.students = students.len();
    if students.is_empty() {
        tracing::info!(academic_year = %academic_year.id, "no active students; nothing to generate");
        return Ok(report);
    }

    for student in &students {
        match generate_for_student(conn, academic_year, student, month, year, now, settings) {
            Ok(outcome) => {
                report.generated += outcome.generated;
                report.skipped += outcome.skipped;
            }
            Err(e) => {
                tracing::warn!(student_id = %student.id, error = %e, "fee generation failed for student");
                report.errors.push(StudentError {
                    student_id: student.id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        month,
        year,
        generated = report.generated,
        skipped = report.skipped,
        errors = report.errors.len(),
        "monthly fee generation finished"
    );
    Ok(report)
}

fn active_students(conn: &Connection, academic_year_id: &str) -> FeeResult<Vec<Student>> {
    let sql = format!(
        "SELECT {} FROM students
         WHERE academic_year_id = ? AND status = ? AND deleted_at IS NULL
         ORDER BY rowid",
        STUDENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            (academic_year_id, StudentStatus::Active.as_str()),
            Student::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// One student's fees commit together or not at all.
fn generate_for_student(
    conn: &Connection,
    academic_year: &AcademicYear,
    student: &Student,
    month: u32,
    year: i32,
    now: NaiveDateTime,
    settings: &FeeSettings,
) -> FeeResult<StudentOutcome> {
    let tx = conn.unchecked_transaction()?;
    let mut outcome = StudentOutcome::default();

    for entry in structures_for_class(&tx, &student.class_id, &academic_year.id)? {
        if entry.fee_type.frequency != FeeFrequency::Monthly {
            continue;
        }
        if fee_exists(&tx, &student.id, &entry.structure.fee_type_id, month, year)? {
            tracing::debug!(
                student_id = %student.id,
                fee_type = %entry.fee_type.name,
                "fee already generated for period"
            );
            outcome.skipped += 1;
            continue;
        }
        if insert_pending_fee(&tx, academic_year, student, &entry, month, year, now, settings)? {
            outcome.generated += 1;
        } else {
            outcome.skipped += 1;
        }
    }

    tx.commit()?;
    Ok(outcome)
}

fn fee_exists(
    conn: &Connection,
    student_id: &str,
    fee_type_id: &str,
    month: u32,
    year: i32,
) -> FeeResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM fee_collections
             WHERE student_id = ? AND fee_type_id = ? AND month = ? AND year = ?",
            (student_id, fee_type_id, month, year),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Returns false when the natural key was taken between the check and the insert.
#[allow(clippy::too_many_arguments)]
fn insert_pending_fee(
    conn: &Connection,
    academic_year: &AcademicYear,
    student: &Student,
    entry: &StructureWithType,
    month: u32,
    year: i32,
    now: NaiveDateTime,
    settings: &FeeSettings,
) -> FeeResult<bool> {
    let due = period::due_date(year, month, entry.structure.due_day, settings.default_due_day)?;
    let receipt = next_receipt_number(conn, &settings.receipt_prefix, now)?;
    let amount = entry.structure.amount;
    let zero = decimal_text(Decimal::ZERO);

    let changed = conn.execute(
        "INSERT INTO fee_collections(
            id, receipt_number, student_id, fee_type_id, academic_year_id, month, year,
            amount, late_fee, discount, total_amount, paid_amount, payment_date,
            status, remarks, collected_by, created_at, updated_at
         ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
         ON CONFLICT(student_id, fee_type_id, month, year) DO NOTHING",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            receipt,
            student.id,
            entry.structure.fee_type_id,
            academic_year.id,
            month,
            year,
            decimal_text(amount),
            zero,
            due,
            FeeStatus::Pending.as_str(),
            settings.auto_remarks,
            settings.system_collector_id,
            now.format(TIMESTAMP_FMT).to_string(),
        ],
    )?;
    if changed == 0 {
        tracing::debug!(student_id = %student.id, "natural key taken concurrently; skipping");
        return Ok(false);
    }
    tracing::debug!(student_id = %student.id, receipt = %receipt, due = %due, "fee generated");
    Ok(true)
}

/// `{prefix}-{YYYYMMDD}-{seq:06}` where seq follows the records created on
/// `now`'s calendar day. Not reserved: two overlapping runs can pick the same
/// number, and the UNIQUE receipt column then fails the later insert.
pub fn next_receipt_number(conn: &Connection, prefix: &str, now: NaiveDateTime) -> FeeResult<String> {
    let day = now.format("%Y-%m-%d").to_string();
    let created_today: i64 = conn.query_row(
        "SELECT COUNT(*) FROM fee_collections WHERE substr(created_at, 1, 10) = ?",
        [&day],
        |r| r.get(0),
    )?;
    Ok(format!(
        "{}-{}-{:06}",
        prefix,
        now.format("%Y%m%d"),
        created_today + 1
    ))
}
