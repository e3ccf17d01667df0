//! Daily overdue sweep: pending fees past their due date become overdue and
//! pick up the structure's late fee once the grace period has run out.

use crate::db::decimal_text;
use crate::error::{FeeError, FeeResult};
use crate::model::{fee_total, FeeCollection, FeeStructure, FEE_COLLECTION_COLUMNS};
use crate::period;
use crate::settings::FeeSettings;
use crate::status::FeeStatus;
use crate::structure::structure_for;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecordError {
    pub fee_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub as_of: NaiveDate,
    pub scanned: usize,
    /// Rows written by this sweep.
    pub updated: usize,
    /// Rows that moved from pending to overdue.
    pub overdue_total: usize,
    pub not_due: usize,
    pub skipped: usize,
    pub errors: Vec<FeeRecordError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    NoPeriod,
    NoStructure,
    NotDue,
    Raced,
    Updated { newly_overdue: bool },
}

/// Late fee owed `days_overdue` days after the due date. Both the amount and
/// the grace period must be configured; the grace day itself is still free.
pub fn late_fee_for(structure: &FeeStructure, days_overdue: i64) -> Decimal {
    match (structure.late_fee, structure.late_fee_days) {
        (Some(fee), Some(grace)) if days_overdue > grace => fee,
        _ => Decimal::ZERO,
    }
}

pub fn sweep_overdue(conn: &Connection, as_of: NaiveDate, settings: &FeeSettings) -> FeeResult<SweepReport> {
    let statuses: &[FeeStatus] = if settings.reassess_overdue {
        &[FeeStatus::Pending, FeeStatus::Overdue]
    } else {
        &[FeeStatus::Pending]
    };
    let candidates = load_candidates(conn, statuses)?;

    let mut report = SweepReport {
        as_of,
        scanned: candidates.len(),
        updated: 0,
        overdue_total: 0,
        not_due: 0,
        skipped: 0,
        errors: Vec::new(),
    };

    for (fee_id, class_id, fee) in candidates {
        let result = fee
            .map_err(FeeError::from)
            .and_then(|fee| evaluate(conn, &fee, &class_id, as_of, settings));
        match result {
            Ok(Outcome::Updated { newly_overdue }) => {
                report.updated += 1;
                if newly_overdue {
                    report.overdue_total += 1;
                }
            }
            Ok(Outcome::NotDue) => report.not_due += 1,
            Ok(Outcome::NoPeriod) | Ok(Outcome::NoStructure) | Ok(Outcome::Raced) => {
                report.skipped += 1
            }
            Err(e) => {
                tracing::warn!(fee_id = %fee_id, error = %e, "overdue evaluation failed");
                report.errors.push(FeeRecordError {
                    fee_id,
                    message: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        as_of = %as_of,
        scanned = report.scanned,
        updated = report.updated,
        overdue = report.overdue_total,
        errors = report.errors.len(),
        "overdue sweep finished"
    );
    Ok(report)
}

type Candidate = (String, String, rusqlite::Result<FeeCollection>);

/// Fees of students that still exist and are not soft-deleted. A row that
/// fails to decode is kept so it can be reported against its id.
fn load_candidates(conn: &Connection, statuses: &[FeeStatus]) -> FeeResult<Vec<Candidate>> {
    let placeholders = vec!["?"; statuses.len()].join(", ");
    let sql = format!(
        "SELECT {}, s.class_id
         FROM fee_collections f
         JOIN students s ON s.id = f.student_id AND s.deleted_at IS NULL
         WHERE f.status IN ({})
         ORDER BY f.created_at, f.rowid",
        FEE_COLLECTION_COLUMNS, placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            rusqlite::params_from_iter(statuses.iter().map(|s| s.as_str())),
            |r| -> rusqlite::Result<Candidate> {
                Ok((r.get(0)?, r.get(17)?, FeeCollection::from_row(r)))
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn evaluate(
    conn: &Connection,
    fee: &FeeCollection,
    class_id: &str,
    as_of: NaiveDate,
    settings: &FeeSettings,
) -> FeeResult<Outcome> {
    let (Some(month), Some(year)) = (fee.month, fee.year) else {
        return Ok(Outcome::NoPeriod);
    };
    let Some(structure) = structure_for(conn, &fee.fee_type_id, class_id, &fee.academic_year_id)? else {
        tracing::debug!(fee_id = %fee.id, "no fee structure; overdue policy unknown");
        return Ok(Outcome::NoStructure);
    };

    let due = period::due_date(year, month, structure.due_day, settings.default_due_day)?;
    if as_of <= due {
        return Ok(Outcome::NotDue);
    }

    let days_overdue = (as_of - due).num_days();
    let late_fee = late_fee_for(&structure, days_overdue);
    let next = match fee.status {
        FeeStatus::Overdue => FeeStatus::Overdue,
        from => from.transition(FeeStatus::Overdue)?,
    };
    let total = fee_total(fee.amount, fee.discount, late_fee);

    // The status guard keeps a payment recorded mid-sweep from being overwritten.
    let changed = conn.execute(
        "UPDATE fee_collections
         SET status = ?, late_fee = ?, total_amount = ?, updated_at = datetime('now')
         WHERE id = ? AND status = ?",
        (
            next.as_str(),
            decimal_text(late_fee),
            decimal_text(total),
            &fee.id,
            fee.status.as_str(),
        ),
    )?;
    if changed == 0 {
        return Ok(Outcome::Raced);
    }
    tracing::debug!(fee_id = %fee.id, days_overdue, late_fee = %late_fee, "fee marked overdue");
    Ok(Outcome::Updated {
        newly_overdue: fee.status == FeeStatus::Pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::generate;
    use crate::test_support::*;
    use rusqlite::OptionalExtension;

    struct Row {
        status: String,
        late_fee: String,
        total: String,
    }

    fn row(conn: &Connection, fee_id: &str) -> Row {
        conn.query_row(
            "SELECT status, late_fee, total_amount FROM fee_collections WHERE id = ?",
            [fee_id],
            |r| {
                Ok(Row {
                    status: r.get(0)?,
                    late_fee: r.get(1)?,
                    total: r.get(2)?,
                })
            },
        )
        .expect("fee row")
    }

    fn insert_fee(conn: &Connection, id: &str, student: &str, fee_type: &str, month: Option<u32>, status: &str) {
        conn.execute(
            "INSERT INTO fee_collections(id, receipt_number, student_id, fee_type_id, academic_year_id,
                month, year, amount, late_fee, discount, total_amount, status, created_at)
             VALUES(?, ?, ?, ?, 'y1', ?, CASE WHEN ? IS NULL THEN NULL ELSE 2024 END,
                '1000', '0', '0', '1000', ?, '2024-03-01 06:00:00')",
            (id, format!("R-{}", id), student, fee_type, month, month, status),
        )
        .expect("insert fee");
    }

    fn grace_fixture() -> Connection {
        let conn = workspace();
        add_student(&conn, "s", "c1", "y1", "active");
        add_structure(&conn, "fs1", "c1", "tuition", "1000", Some(10), Some("50"), Some(5));
        insert_fee(&conn, "f", "s", "tuition", Some(3), "pending");
        conn
    }

    #[test]
    fn within_grace_marks_overdue_without_late_fee() {
        let conn = grace_fixture();
        let report = sweep_overdue(&conn, ymd(2024, 3, 14), &FeeSettings::default()).expect("sweep");
        assert_eq!((report.updated, report.overdue_total), (1, 1));
        let r = row(&conn, "f");
        assert_eq!(r.status, "overdue");
        assert_eq!(r.late_fee, "0");
        assert_eq!(r.total, "1000");
    }

    #[test]
    fn past_grace_applies_late_fee() {
        let conn = grace_fixture();
        sweep_overdue(&conn, ymd(2024, 3, 16), &FeeSettings::default()).expect("sweep");
        let r = row(&conn, "f");
        assert_eq!(r.status, "overdue");
        assert_eq!(r.late_fee, "50");
        assert_eq!(r.total, "1050");
    }

    #[test]
    fn last_grace_day_is_free() {
        let conn = grace_fixture();
        sweep_overdue(&conn, ymd(2024, 3, 15), &FeeSettings::default()).expect("sweep");
        assert_eq!(row(&conn, "f").late_fee, "0");
    }

    #[test]
    fn on_or_before_due_date_stays_pending() {
        let conn = grace_fixture();
        let report = sweep_overdue(&conn, ymd(2024, 3, 10), &FeeSettings::default()).expect("sweep");
        assert_eq!((report.updated, report.not_due), (0, 1));
        assert_eq!(row(&conn, "f").status, "pending");
        sweep_overdue(&conn, ymd(2024, 2, 1), &FeeSettings::default()).expect("sweep");
        assert_eq!(row(&conn, "f").status, "pending");
    }

    #[test]
    fn generated_fee_escalates_end_to_end() {
        let conn = workspace();
        add_student(&conn, "s", "c1", "y1", "active");
        add_structure(&conn, "fs1", "c1", "tuition", "1000", Some(10), Some("100"), Some(3));
        let year = current_year(&conn);
        let settings = FeeSettings::default();
        let generated = generate(&conn, &year, 3, 2024, at(2024, 3, 1, 6), &settings).expect("generate");
        assert_eq!(generated.generated, 1);

        let report = sweep_overdue(&conn, ymd(2024, 3, 15), &settings).expect("sweep");
        assert_eq!((report.updated, report.overdue_total), (1, 1));
        let (status, late_fee, total): (String, String, String) = conn
            .query_row(
                "SELECT status, late_fee, total_amount FROM fee_collections WHERE student_id = 's'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .expect("fee");
        assert_eq!(status, "overdue");
        assert_eq!(late_fee, "100");
        assert_eq!(total, "1100");
    }

    #[test]
    fn null_period_fees_never_become_overdue() {
        let conn = workspace();
        add_student(&conn, "s", "c1", "y1", "active");
        add_structure(&conn, "fs1", "c1", "admission", "1000", Some(1), Some("10"), Some(0));
        insert_fee(&conn, "adm", "s", "admission", None, "pending");
        let report = sweep_overdue(&conn, ymd(2030, 1, 1), &FeeSettings::default()).expect("sweep");
        assert_eq!((report.updated, report.skipped), (0, 1));
        assert_eq!(row(&conn, "adm").status, "pending");
    }

    #[test]
    fn terminal_and_overdue_rows_are_left_alone() {
        let conn = grace_fixture();
        insert_fee(&conn, "paid", "s", "transport", Some(3), "paid");
        insert_fee(&conn, "gone", "s", "tuition", Some(4), "cancelled");
        conn.execute("UPDATE fee_collections SET status = 'overdue' WHERE id = 'f'", [])
            .expect("mark overdue");

        let report = sweep_overdue(&conn, ymd(2024, 6, 1), &FeeSettings::default()).expect("sweep");
        assert_eq!(report.scanned, 0);
        assert_eq!(row(&conn, "paid").status, "paid");
        assert_eq!(row(&conn, "gone").status, "cancelled");
        let f = row(&conn, "f");
        assert_eq!(f.status, "overdue");
        assert_eq!(f.late_fee, "0");
    }

    #[test]
    fn reassessment_applies_late_fee_once_grace_expires() {
        let conn = grace_fixture();
        let settings = FeeSettings {
            reassess_overdue: true,
            ..FeeSettings::default()
        };
        sweep_overdue(&conn, ymd(2024, 3, 12), &settings).expect("first sweep");
        assert_eq!(row(&conn, "f").late_fee, "0");

        let report = sweep_overdue(&conn, ymd(2024, 3, 20), &settings).expect("second sweep");
        assert_eq!((report.updated, report.overdue_total), (1, 0));
        let f = row(&conn, "f");
        assert_eq!(f.status, "overdue");
        assert_eq!(f.late_fee, "50");
        assert_eq!(f.total, "1050");
    }

    #[test]
    fn missing_structure_leaves_fee_pending() {
        let conn = grace_fixture();
        insert_fee(&conn, "t", "s", "transport", Some(3), "pending");
        let report = sweep_overdue(&conn, ymd(2024, 4, 1), &FeeSettings::default()).expect("sweep");
        assert_eq!(report.skipped, 1);
        assert_eq!(row(&conn, "t").status, "pending");
        assert_eq!(row(&conn, "f").status, "overdue");
    }

    #[test]
    fn soft_deleted_students_are_excluded() {
        let conn = grace_fixture();
        conn.execute("UPDATE students SET deleted_at = datetime('now') WHERE id = 's'", [])
            .expect("soft delete");
        let report = sweep_overdue(&conn, ymd(2024, 4, 1), &FeeSettings::default()).expect("sweep");
        assert_eq!(report.scanned, 0);
        assert_eq!(row(&conn, "f").status, "pending");
    }

    #[test]
    fn total_respects_discount() {
        let conn = grace_fixture();
        conn.execute("UPDATE fee_collections SET discount = '100', total_amount = '900' WHERE id = 'f'", [])
            .expect("discount");
        sweep_overdue(&conn, ymd(2024, 4, 1), &FeeSettings::default()).expect("sweep");
        let f = row(&conn, "f");
        assert_eq!(f.late_fee, "50");
        assert_eq!(f.total, "950");
    }

    #[test]
    fn unreadable_record_is_reported_and_sweep_continues() {
        let conn = grace_fixture();
        insert_fee(&conn, "bad", "s", "tuition", Some(4), "pending");
        conn.execute("UPDATE fee_collections SET amount = 'n/a' WHERE id = 'bad'", [])
            .expect("corrupt");
        let report = sweep_overdue(&conn, ymd(2024, 6, 1), &FeeSettings::default()).expect("sweep");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].fee_id, "bad");
        assert_eq!(row(&conn, "f").status, "overdue");
    }

    #[test]
    fn late_fee_needs_both_amount_and_grace() {
        let mut s = FeeStructure {
            id: "fs".into(),
            class_id: "c".into(),
            fee_type_id: "t".into(),
            academic_year_id: "y".into(),
            amount: Decimal::from(1000),
            due_day: Some(10),
            late_fee: Some(Decimal::from(50)),
            late_fee_days: None,
        };
        assert_eq!(late_fee_for(&s, 100), Decimal::ZERO);
        s.late_fee_days = Some(0);
        assert_eq!(late_fee_for(&s, 1), Decimal::from(50));
        assert_eq!(late_fee_for(&s, 0), Decimal::ZERO);
        s.late_fee = None;
        assert_eq!(late_fee_for(&s, 100), Decimal::ZERO);
    }

    #[test]
    fn sweep_on_empty_ledger_is_a_noop() {
        let conn = workspace();
        let report = sweep_overdue(&conn, ymd(2024, 3, 1), &FeeSettings::default()).expect("sweep");
        assert_eq!((report.scanned, report.updated), (0, 0));
        let any: Option<i64> = conn
            .query_row("SELECT 1 FROM fee_collections", [], |r| r.get(0))
            .optional()
            .expect("query");
        assert!(any.is_none());
    }

    #[test]
    fn payment_recorded_after_read_is_not_overwritten() {
        let conn = grace_fixture();
        let sql = format!("SELECT {} FROM fee_collections f WHERE f.id = 'f'", FEE_COLLECTION_COLUMNS);
        let stale = conn.query_row(&sql, [], FeeCollection::from_row).expect("read pending fee");
        assert_eq!(stale.status, FeeStatus::Pending);

        conn.execute(
            "UPDATE fee_collections SET status = 'paid', paid_amount = total_amount WHERE id = 'f'",
            [],
        )
        .expect("record payment");

        let outcome = evaluate(&conn, &stale, "c1", ymd(2024, 3, 16), &FeeSettings::default()).expect("evaluate");
        assert_eq!(outcome, Outcome::Raced);
        let r = row(&conn, "f");
        assert_eq!(r.status, "paid");
        assert_eq!(r.late_fee, "0");
        assert_eq!(r.total, "1000");
    }
}
