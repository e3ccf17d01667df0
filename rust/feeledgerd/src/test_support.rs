//! In-memory workspace fixtures shared by unit tests.

use crate::db;
use crate::model::AcademicYear;
use crate::period;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    ymd(y, m, d).and_hms_opt(h, 0, 0).expect("valid time")
}

/// Year `y1` (2024-01-01..=2024-12-31) is current, class `c1` exists.
pub fn workspace() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    db::init_schema(&conn).expect("init schema");
    conn.execute_batch(
        "INSERT INTO academic_years(id, name, start_date, end_date, is_current)
           VALUES('y1', '2024', '2024-01-01', '2024-12-31', 1),
                 ('y0', '2023', '2023-01-01', '2023-12-31', 0);
         INSERT INTO classes(id, name) VALUES('c1', 'Grade 5'), ('c2', 'Grade 6');
         INSERT INTO fee_types(id, name, frequency) VALUES
           ('tuition', 'Tuition', 'monthly'),
           ('transport', 'Transport', 'monthly'),
           ('admission', 'Admission', 'one_time');",
    )
    .expect("seed reference data");
    conn
}

pub fn current_year(conn: &Connection) -> AcademicYear {
    period::current_academic_year(conn).expect("current year")
}

pub fn add_student(conn: &Connection, id: &str, class_id: &str, year_id: &str, status: &str) {
    conn.execute(
        "INSERT INTO students(id, class_id, academic_year_id, name, status) VALUES(?, ?, ?, ?, ?)",
        (id, class_id, year_id, format!("Student {}", id), status),
    )
    .expect("insert student");
}

#[allow(clippy::too_many_arguments)]
pub fn add_structure(
    conn: &Connection,
    id: &str,
    class_id: &str,
    fee_type_id: &str,
    amount: &str,
    due_day: Option<u32>,
    late_fee: Option<&str>,
    late_fee_days: Option<i64>,
) {
    conn.execute(
        "INSERT INTO fee_structures(id, class_id, fee_type_id, academic_year_id, amount, due_day, late_fee, late_fee_days, created_at)
         VALUES(?, ?, ?, 'y1', ?, ?, ?, ?, datetime('now'))",
        (id, class_id, fee_type_id, amount, due_day, late_fee, late_fee_days),
    )
    .expect("insert structure");
}

pub fn count_fees(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM fee_collections", [], |r| r.get(0))
        .expect("count fees")
}
