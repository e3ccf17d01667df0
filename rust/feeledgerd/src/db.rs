use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

pub const DB_FILE_NAME: &str = "feeledger.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_years(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active'
        )",
        [],
    )?;
    // Only one row may carry the current flag.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_academic_years_current
         ON academic_years(is_current) WHERE is_current = 1",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    ensure_students_deleted_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_year_status ON students(academic_year_id, status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_types(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            frequency TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_structures(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            fee_type_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            amount TEXT NOT NULL,
            due_day INTEGER,
            late_fee TEXT,
            late_fee_days INTEGER,
            created_at TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(fee_type_id) REFERENCES fee_types(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_structures_class_year
         ON fee_structures(class_id, academic_year_id)",
        [],
    )?;

    // Amounts are canonical decimal strings; see `decimal_col`.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_collections(
            id TEXT PRIMARY KEY,
            receipt_number TEXT NOT NULL UNIQUE,
            student_id TEXT NOT NULL,
            fee_type_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            month INTEGER,
            year INTEGER,
            amount TEXT NOT NULL,
            late_fee TEXT NOT NULL DEFAULT '0',
            discount TEXT NOT NULL DEFAULT '0',
            total_amount TEXT NOT NULL,
            paid_amount TEXT NOT NULL DEFAULT '0',
            payment_date TEXT,
            status TEXT NOT NULL,
            remarks TEXT,
            collected_by TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(fee_type_id) REFERENCES fee_types(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id),
            UNIQUE(student_id, fee_type_id, month, year)
        )",
        [],
    )?;
    ensure_fee_collections_updated_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_collections_status ON fee_collections(status)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_collections_created ON fee_collections(created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Canonical text form for a stored amount.
pub fn decimal_text(d: Decimal) -> String {
    d.normalize().to_string()
}

pub fn decimal_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let s: String = row.get(idx)?;
    Decimal::from_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn decimal_col_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        Decimal::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn ensure_students_deleted_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "deleted_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN deleted_at TEXT", [])?;
    Ok(())
}

fn ensure_fee_collections_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "fee_collections", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE fee_collections ADD COLUMN updated_at TEXT", [])?;
    // Older rows were never touched after insert.
    conn.execute(
        "UPDATE fee_collections SET updated_at = created_at WHERE updated_at IS NULL",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
