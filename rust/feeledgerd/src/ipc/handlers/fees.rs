use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    get_opt_date, get_opt_i32, get_opt_str, get_opt_u32, get_required_i32, get_required_str,
    get_required_u32, require_db,
};
use crate::ipc::types::{AppState, Request};
use crate::jobs;
use crate::ledger::{self, FeeFilter};
use crate::status::FeeStatus;
use chrono::Local;
use serde_json::{json, Value};
use std::str::FromStr;

type HandlerResult = Result<Value, HandlerErr>;

fn fees_generate_monthly(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let month = get_opt_u32(params, "month")?;
    let year = get_opt_i32(params, "year")?;
    let report = jobs::generate_monthly_fees(conn, month, year, Local::now().naive_local())?;
    Ok(serde_json::to_value(report)?)
}

fn fees_update_overdue(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let as_of = get_opt_date(params, "asOf")?.unwrap_or_else(|| Local::now().date_naive());
    let report = jobs::update_overdue_fees(conn, as_of)?;
    Ok(serde_json::to_value(report)?)
}

fn fees_list(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let status = get_opt_str(params, "status")?
        .map(|s| FeeStatus::from_str(&s))
        .transpose()?;
    let filter = FeeFilter {
        student_id: get_opt_str(params, "studentId")?,
        month: get_opt_u32(params, "month")?,
        year: get_opt_i32(params, "year")?,
        status,
    };
    Ok(json!({ "fees": ledger::list_fees(conn, &filter)? }))
}

fn fees_summary(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let month = get_required_u32(params, "month")?;
    let year = get_required_i32(params, "year")?;
    Ok(serde_json::to_value(ledger::period_summary(conn, month, year)?)?)
}

fn fees_transition(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let fee_id = get_required_str(params, "feeId")?;
    let to = FeeStatus::from_str(&get_required_str(params, "status")?)?;
    let on = get_opt_date(params, "paidOn")?.unwrap_or_else(|| Local::now().date_naive());
    Ok(json!({ "fee": ledger::transition_fee(conn, &fee_id, to, on)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "fees.generateMonthly" => fees_generate_monthly(state, p),
        "fees.updateOverdue" => fees_update_overdue(state, p),
        "fees.list" => fees_list(state, p),
        "fees.summary" => fees_summary(state, p),
        "fees.transition" => fees_transition(state, p),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
