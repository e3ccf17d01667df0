//! Row types for the fee ledger tables.
//!
//! Each `from_row` expects the column order of the matching `*_COLUMNS` constant.

use crate::db::{decimal_col, decimal_col_opt};
use crate::error::FeeError;
use crate::status::FeeStatus;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::Row;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_current: bool,
    pub status: String,
}

pub const ACADEMIC_YEAR_COLUMNS: &str = "id, name, start_date, end_date, is_current, status";

impl AcademicYear {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(AcademicYear {
            id: r.get(0)?,
            name: r.get(1)?,
            start_date: r.get(2)?,
            end_date: r.get(3)?,
            is_current: r.get::<_, i64>(4)? != 0,
            status: r.get(5)?,
        })
    }

    /// Inclusive on both ends.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Active,
    Inactive,
    Graduated,
}

impl StudentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Inactive => "inactive",
            StudentStatus::Graduated => "graduated",
        }
    }
}

impl FromStr for StudentStatus {
    type Err = FeeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(StudentStatus::Active),
            "inactive" => Ok(StudentStatus::Inactive),
            "graduated" => Ok(StudentStatus::Graduated),
            other => Err(FeeError::Validation(format!(
                "student status must be one of: active, inactive, graduated (got {})",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub academic_year_id: String,
    pub name: String,
    pub status: StudentStatus,
}

pub const STUDENT_COLUMNS: &str = "id, class_id, academic_year_id, name, status";

impl Student {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        let raw: String = r.get(4)?;
        let status = StudentStatus::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
        Ok(Student {
            id: r.get(0)?,
            class_id: r.get(1)?,
            academic_year_id: r.get(2)?,
            name: r.get(3)?,
            status,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeFrequency {
    Monthly,
    Quarterly,
    Yearly,
    OneTime,
}

impl FeeFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            FeeFrequency::Monthly => "monthly",
            FeeFrequency::Quarterly => "quarterly",
            FeeFrequency::Yearly => "yearly",
            FeeFrequency::OneTime => "one_time",
        }
    }
}

impl FromStr for FeeFrequency {
    type Err = FeeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(FeeFrequency::Monthly),
            "quarterly" => Ok(FeeFrequency::Quarterly),
            "yearly" | "annual" => Ok(FeeFrequency::Yearly),
            "one_time" | "one-time" | "onetime" => Ok(FeeFrequency::OneTime),
            other => Err(FeeError::Validation(format!(
                "frequency must be one of: monthly, quarterly, yearly, one_time (got {})",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeType {
    pub id: String,
    pub name: String,
    pub frequency: FeeFrequency,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeStructure {
    pub id: String,
    pub class_id: String,
    pub fee_type_id: String,
    pub academic_year_id: String,
    pub amount: Decimal,
    pub due_day: Option<u32>,
    pub late_fee: Option<Decimal>,
    pub late_fee_days: Option<i64>,
}

pub const FEE_STRUCTURE_COLUMNS: &str =
    "fs.id, fs.class_id, fs.fee_type_id, fs.academic_year_id, fs.amount, fs.due_day, fs.late_fee, fs.late_fee_days";

impl FeeStructure {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(FeeStructure {
            id: r.get(0)?,
            class_id: r.get(1)?,
            fee_type_id: r.get(2)?,
            academic_year_id: r.get(3)?,
            amount: decimal_col(r, 4)?,
            due_day: r.get(5)?,
            late_fee: decimal_col_opt(r, 6)?,
            late_fee_days: r.get(7)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeCollection {
    pub id: String,
    pub receipt_number: String,
    pub student_id: String,
    pub fee_type_id: String,
    pub academic_year_id: String,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub amount: Decimal,
    pub late_fee: Decimal,
    pub discount: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub payment_date: Option<NaiveDate>,
    pub status: FeeStatus,
    pub remarks: Option<String>,
    pub collected_by: Option<String>,
    pub created_at: NaiveDateTime,
}

pub const FEE_COLLECTION_COLUMNS: &str = "f.id, f.receipt_number, f.student_id, f.fee_type_id, f.academic_year_id, \
     f.month, f.year, f.amount, f.late_fee, f.discount, f.total_amount, f.paid_amount, \
     f.payment_date, f.status, f.remarks, f.collected_by, f.created_at";

impl FeeCollection {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        let raw_status: String = r.get(13)?;
        let status = FeeStatus::from_str(&raw_status)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(13, Type::Text, Box::new(e)))?;
        Ok(FeeCollection {
            id: r.get(0)?,
            receipt_number: r.get(1)?,
            student_id: r.get(2)?,
            fee_type_id: r.get(3)?,
            academic_year_id: r.get(4)?,
            month: r.get(5)?,
            year: r.get(6)?,
            amount: decimal_col(r, 7)?,
            late_fee: decimal_col(r, 8)?,
            discount: decimal_col(r, 9)?,
            total_amount: decimal_col(r, 10)?,
            paid_amount: decimal_col(r, 11)?,
            payment_date: r.get(12)?,
            status,
            remarks: r.get(14)?,
            collected_by: r.get(15)?,
            created_at: r.get(16)?,
        })
    }
}

/// `amount - discount + late_fee`, the total every non-paid record must carry.
pub fn fee_total(amount: Decimal, discount: Decimal, late_fee: Decimal) -> Decimal {
    amount - discount + late_fee
}
