//! Read side of the fee ledger plus the status-change boundary used by the
//! collection workflow.

use crate::db::decimal_text;
use crate::error::{FeeError, FeeResult};
use crate::model::{FeeCollection, FEE_COLLECTION_COLUMNS};
use crate::status::FeeStatus;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct FeeFilter {
    pub student_id: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub status: Option<FeeStatus>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTotals {
    pub count: usize,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub month: u32,
    pub year: i32,
    pub by_status: BTreeMap<&'static str, StatusTotals>,
    pub billed: Decimal,
    pub late_fees: Decimal,
    /// Open balance on pending and overdue fees.
    pub outstanding: Decimal,
}

pub fn get_fee(conn: &Connection, fee_id: &str) -> FeeResult<FeeCollection> {
    let sql = format!(
        "SELECT {} FROM fee_collections f WHERE f.id = ?",
        FEE_COLLECTION_COLUMNS
    );
    conn.query_row(&sql, [fee_id], FeeCollection::from_row)
        .optional()?
        .ok_or(FeeError::NotFound("fee"))
}

pub fn list_fees(conn: &Connection, filter: &FeeFilter) -> FeeResult<Vec<FeeCollection>> {
    let sql = format!(
        "SELECT {} FROM fee_collections f
         WHERE (?1 IS NULL OR f.student_id = ?1)
           AND (?2 IS NULL OR f.month = ?2)
           AND (?3 IS NULL OR f.year = ?3)
           AND (?4 IS NULL OR f.status = ?4)
         ORDER BY f.year, f.month, f.receipt_number",
        FEE_COLLECTION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            (
                filter.student_id.as_deref(),
                filter.month,
                filter.year,
                filter.status.map(FeeStatus::as_str),
            ),
            FeeCollection::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn period_summary(conn: &Connection, month: u32, year: i32) -> FeeResult<PeriodSummary> {
    let fees = list_fees(
        conn,
        &FeeFilter {
            month: Some(month),
            year: Some(year),
            ..FeeFilter::default()
        },
    )?;

    let mut summary = PeriodSummary {
        month,
        year,
        by_status: BTreeMap::new(),
        billed: Decimal::ZERO,
        late_fees: Decimal::ZERO,
        outstanding: Decimal::ZERO,
    };
    for fee in &fees {
        let bucket = summary.by_status.entry(fee.status.as_str()).or_default();
        bucket.count += 1;
        bucket.total_amount += fee.total_amount;
        bucket.paid_amount += fee.paid_amount;
        if fee.status == FeeStatus::Cancelled {
            continue;
        }
        summary.billed += fee.total_amount;
        summary.late_fees += fee.late_fee;
        if !fee.status.is_terminal() {
            summary.outstanding += fee.total_amount - fee.paid_amount;
        }
    }
    Ok(summary)
}

/// Applies a status change after checking it against the transition table.
///
/// Paying settles the full total on `on`. Cancelling and manual escalation
/// only change the status.
pub fn transition_fee(
    conn: &Connection,
    fee_id: &str,
    to: FeeStatus,
    on: NaiveDate,
) -> FeeResult<FeeCollection> {
    let fee = get_fee(conn, fee_id)?;
    let next = fee.status.transition(to)?;

    let changed = match next {
        FeeStatus::Paid => conn.execute(
            "UPDATE fee_collections
             SET status = ?, paid_amount = total_amount, payment_date = ?, updated_at = datetime('now')
             WHERE id = ? AND status = ?",
            (next.as_str(), on, fee_id, fee.status.as_str()),
        )?,
        _ => conn.execute(
            "UPDATE fee_collections SET status = ?, updated_at = datetime('now')
             WHERE id = ? AND status = ?",
            (next.as_str(), fee_id, fee.status.as_str()),
        )?,
    };
    if changed == 0 {
        // Someone else moved the record since it was read; report against the new state.
        let current = get_fee(conn, fee_id)?;
        return Err(FeeError::InvalidTransition {
            from: current.status,
            to,
        });
    }
    tracing::info!(
        fee_id = %fee_id,
        from = %fee.status,
        to = %next,
        total = %decimal_text(fee.total_amount),
        "fee status changed"
    );
    get_fee(conn, fee_id)
}
