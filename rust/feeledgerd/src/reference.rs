//! Administrative reference data the fee jobs read: academic years, classes,
//! students, fee types and fee structures.

use crate::db::decimal_text;
use crate::error::{FeeError, FeeResult};
use crate::model::{
    AcademicYear, FeeFrequency, FeeStructure, FeeType, Student, StudentStatus,
    ACADEMIC_YEAR_COLUMNS, FEE_STRUCTURE_COLUMNS, STUDENT_COLUMNS,
};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub name: String,
    pub student_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewFeeStructure {
    pub class_id: String,
    pub fee_type_id: String,
    pub academic_year_id: String,
    pub amount: Decimal,
    pub due_day: Option<u32>,
    pub late_fee: Option<Decimal>,
    pub late_fee_days: Option<i64>,
}

fn non_empty(name: &str, what: &str) -> FeeResult<String> {
    let t = name.trim();
    if t.is_empty() {
        return Err(FeeError::Validation(format!("{} must not be empty", what)));
    }
    Ok(t.to_string())
}

fn exists(conn: &Connection, table: &str, id: &str) -> FeeResult<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

fn require(conn: &Connection, table: &str, id: &str, what: &'static str) -> FeeResult<()> {
    if exists(conn, table, id)? {
        Ok(())
    } else {
        Err(FeeError::NotFound(what))
    }
}

pub fn get_academic_year(conn: &Connection, id: &str) -> FeeResult<AcademicYear> {
    let sql = format!("SELECT {} FROM academic_years WHERE id = ?", ACADEMIC_YEAR_COLUMNS);
    conn.query_row(&sql, [id], AcademicYear::from_row)
        .optional()?
        .ok_or(FeeError::NotFound("academic year"))
}

pub fn create_academic_year(
    conn: &Connection,
    name: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> FeeResult<AcademicYear> {
    let name = non_empty(name, "name")?;
    if start_date > end_date {
        return Err(FeeError::Validation(
            "startDate must not be after endDate".to_string(),
        ));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO academic_years(id, name, start_date, end_date, is_current, status)
         VALUES(?, ?, ?, ?, 0, 'active')",
        (&id, &name, start_date, end_date),
    )?;
    get_academic_year(conn, &id)
}

pub fn list_academic_years(conn: &Connection) -> FeeResult<Vec<AcademicYear>> {
    let sql = format!(
        "SELECT {} FROM academic_years ORDER BY start_date",
        ACADEMIC_YEAR_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], AcademicYear::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Moves the current flag to `id`. This is the only writer of `is_current`.
pub fn set_current_academic_year(conn: &Connection, id: &str) -> FeeResult<AcademicYear> {
    let year = get_academic_year(conn, id)?;
    if year.status == "closed" {
        return Err(FeeError::Validation(
            "a closed academic year cannot be made current".to_string(),
        ));
    }
    let tx = conn.unchecked_transaction()?;
    tx.execute("UPDATE academic_years SET is_current = 0 WHERE is_current = 1", [])?;
    tx.execute("UPDATE academic_years SET is_current = 1 WHERE id = ?", [id])?;
    tx.commit()?;
    tracing::info!(academic_year = %id, name = %year.name, "current academic year changed");
    get_academic_year(conn, id)
}

pub fn close_academic_year(conn: &Connection, id: &str) -> FeeResult<AcademicYear> {
    let year = get_academic_year(conn, id)?;
    if year.is_current {
        return Err(FeeError::Validation(
            "the current academic year cannot be closed".to_string(),
        ));
    }
    conn.execute("UPDATE academic_years SET status = 'closed' WHERE id = ?", [id])?;
    get_academic_year(conn, id)
}

pub fn create_class(conn: &Connection, name: &str) -> FeeResult<Class> {
    let name = non_empty(name, "name")?;
    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO classes(id, name) VALUES(?, ?)", (&id, &name))?;
    Ok(Class {
        id,
        name,
        student_count: 0,
    })
}

pub fn list_classes(conn: &Connection) -> FeeResult<Vec<Class>> {
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id AND s.deleted_at IS NULL)
         FROM classes c
         ORDER BY c.name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Class {
                id: r.get(0)?,
                name: r.get(1)?,
                student_count: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_student(conn: &Connection, id: &str) -> FeeResult<Student> {
    let sql = format!(
        "SELECT {} FROM students WHERE id = ? AND deleted_at IS NULL",
        STUDENT_COLUMNS
    );
    conn.query_row(&sql, [id], Student::from_row)
        .optional()?
        .ok_or(FeeError::NotFound("student"))
}

pub fn create_student(
    conn: &Connection,
    class_id: &str,
    academic_year_id: &str,
    name: &str,
    status: StudentStatus,
) -> FeeResult<Student> {
    let name = non_empty(name, "name")?;
    require(conn, "classes", class_id, "class")?;
    require(conn, "academic_years", academic_year_id, "academic year")?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, academic_year_id, name, status) VALUES(?, ?, ?, ?, ?)",
        (&id, class_id, academic_year_id, &name, status.as_str()),
    )?;
    get_student(conn, &id)
}

pub fn list_students(
    conn: &Connection,
    class_id: Option<&str>,
    academic_year_id: Option<&str>,
) -> FeeResult<Vec<Student>> {
    let sql = format!(
        "SELECT {} FROM students
         WHERE deleted_at IS NULL
           AND (?1 IS NULL OR class_id = ?1)
           AND (?2 IS NULL OR academic_year_id = ?2)
         ORDER BY name, rowid",
        STUDENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((class_id, academic_year_id), Student::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_student_status(conn: &Connection, id: &str, status: StudentStatus) -> FeeResult<Student> {
    let changed = conn.execute(
        "UPDATE students SET status = ? WHERE id = ? AND deleted_at IS NULL",
        (status.as_str(), id),
    )?;
    if changed == 0 {
        return Err(FeeError::NotFound("student"));
    }
    get_student(conn, id)
}

/// Soft delete. Fee history stays, but the student drops out of both jobs.
pub fn delete_student(conn: &Connection, id: &str) -> FeeResult<()> {
    let changed = conn.execute(
        "UPDATE students SET deleted_at = datetime('now') WHERE id = ? AND deleted_at IS NULL",
        [id],
    )?;
    if changed == 0 {
        return Err(FeeError::NotFound("student"));
    }
    Ok(())
}

pub fn create_fee_type(conn: &Connection, name: &str, frequency: FeeFrequency) -> FeeResult<FeeType> {
    let name = non_empty(name, "name")?;
    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM fee_types WHERE name = ?", [&name], |r| r.get(0))
        .optional()?;
    if taken.is_some() {
        return Err(FeeError::Validation(format!("fee type {} already exists", name)));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO fee_types(id, name, frequency) VALUES(?, ?, ?)",
        (&id, &name, frequency.as_str()),
    )?;
    Ok(FeeType { id, name, frequency })
}

pub fn list_fee_types(conn: &Connection) -> FeeResult<Vec<FeeType>> {
    let mut stmt = conn.prepare("SELECT id, name, frequency FROM fee_types ORDER BY name")?;
    let rows = stmt
        .query_map([], |r| {
            let raw: String = r.get(2)?;
            let frequency = FeeFrequency::from_str(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
            })?;
            Ok(FeeType {
                id: r.get(0)?,
                name: r.get(1)?,
                frequency,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Duplicate (class, fee type, year) structures are accepted; lookups use the
/// earliest one.
pub fn create_fee_structure(conn: &Connection, new: NewFeeStructure) -> FeeResult<FeeStructure> {
    if new.amount < Decimal::ZERO {
        return Err(FeeError::Validation("amount must not be negative".to_string()));
    }
    if let Some(day) = new.due_day {
        if !(1..=31).contains(&day) {
            return Err(FeeError::Validation("dueDay must be in 1..=31".to_string()));
        }
    }
    if new.late_fee.is_some_and(|f| f < Decimal::ZERO) {
        return Err(FeeError::Validation("lateFee must not be negative".to_string()));
    }
    if new.late_fee_days.is_some_and(|d| d < 0) {
        return Err(FeeError::Validation("lateFeeDays must not be negative".to_string()));
    }
    require(conn, "classes", &new.class_id, "class")?;
    require(conn, "fee_types", &new.fee_type_id, "fee type")?;
    require(conn, "academic_years", &new.academic_year_id, "academic year")?;

    let duplicates: i64 = conn.query_row(
        "SELECT COUNT(*) FROM fee_structures WHERE class_id = ? AND fee_type_id = ? AND academic_year_id = ?",
        (&new.class_id, &new.fee_type_id, &new.academic_year_id),
        |r| r.get(0),
    )?;
    if duplicates > 0 {
        tracing::warn!(
            class_id = %new.class_id,
            fee_type_id = %new.fee_type_id,
            "fee structure already defined for class and year; the earliest one stays in effect"
        );
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO fee_structures(id, class_id, fee_type_id, academic_year_id, amount, due_day, late_fee, late_fee_days, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%d %H:%M:%f', 'now'))",
        (
            &id,
            &new.class_id,
            &new.fee_type_id,
            &new.academic_year_id,
            decimal_text(new.amount),
            new.due_day,
            new.late_fee.map(decimal_text),
            new.late_fee_days,
        ),
    )?;
    Ok(FeeStructure {
        id,
        class_id: new.class_id,
        fee_type_id: new.fee_type_id,
        academic_year_id: new.academic_year_id,
        amount: new.amount,
        due_day: new.due_day,
        late_fee: new.late_fee,
        late_fee_days: new.late_fee_days,
    })
}

pub fn list_fee_structures(
    conn: &Connection,
    class_id: Option<&str>,
    academic_year_id: Option<&str>,
) -> FeeResult<Vec<FeeStructure>> {
    let sql = format!(
        "SELECT {} FROM fee_structures fs
         WHERE (?1 IS NULL OR fs.class_id = ?1)
           AND (?2 IS NULL OR fs.academic_year_id = ?2)
         ORDER BY fs.created_at, fs.rowid",
        FEE_STRUCTURE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((class_id, academic_year_id), FeeStructure::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
