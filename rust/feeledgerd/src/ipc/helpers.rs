use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Missing and explicit null are treated the same.
fn present<'a>(params: &'a Value, key: &str) -> Option<&'a Value> {
    params.get(key).filter(|v| !v.is_null())
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    get_opt_str(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    let Some(v) = present(params, key) else {
        return Ok(None);
    };
    v.as_str()
        .map(|s| Some(s.trim().to_string()))
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string", key)))
}

pub fn get_opt_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    let Some(v) = present(params, key) else {
        return Ok(None);
    };
    v.as_i64()
        .map(Some)
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer", key)))
}

pub fn get_opt_u32(params: &Value, key: &str) -> Result<Option<u32>, HandlerErr> {
    match get_opt_i64(params, key)? {
        None => Ok(None),
        Some(n) => u32::try_from(n)
            .map(Some)
            .map_err(|_| HandlerErr::bad_params(format!("{} must not be negative", key))),
    }
}

pub fn get_opt_i32(params: &Value, key: &str) -> Result<Option<i32>, HandlerErr> {
    match get_opt_i64(params, key)? {
        None => Ok(None),
        Some(n) => i32::try_from(n)
            .map(Some)
            .map_err(|_| HandlerErr::bad_params(format!("{} is out of range", key))),
    }
}

pub fn get_required_u32(params: &Value, key: &str) -> Result<u32, HandlerErr> {
    get_opt_u32(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_required_i32(params: &Value, key: &str) -> Result<i32, HandlerErr> {
    get_opt_i32(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    let Some(s) = get_opt_str(params, key)? else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub fn get_required_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    get_opt_date(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Amounts may be sent as JSON numbers or decimal strings.
pub fn get_opt_decimal(params: &Value, key: &str) -> Result<Option<Decimal>, HandlerErr> {
    let Some(v) = present(params, key) else {
        return Ok(None);
    };
    let text = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Err(HandlerErr::bad_params(format!("{} must be a number", key))),
    };
    Decimal::from_str(&text)
        .map(Some)
        .map_err(|_| HandlerErr::bad_params(format!("{} must be a decimal amount", key)))
}

pub fn get_required_decimal(params: &Value, key: &str) -> Result<Decimal, HandlerErr> {
    get_opt_decimal(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    let Some(v) = present(params, key) else {
        return Ok(None);
    };
    v.as_bool()
        .map(Some)
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key)))
}
