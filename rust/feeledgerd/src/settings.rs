use crate::db;
use crate::error::{FeeError, FeeResult};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FEES_SETTINGS_KEY: &str = "setup.fees";

/// Workspace-level policy for the fee jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeeSettings {
    /// Used when a fee structure has no due day.
    pub default_due_day: u32,
    pub receipt_prefix: String,
    /// Recorded as `collected_by` on generated fees.
    pub system_collector_id: String,
    pub auto_remarks: String,
    /// Also recompute late fees on records that are already overdue.
    pub reassess_overdue: bool,
}

impl Default for FeeSettings {
    fn default() -> Self {
        FeeSettings {
            default_due_day: 10,
            receipt_prefix: "FEE".to_string(),
            system_collector_id: "system".to_string(),
            auto_remarks: "Auto-generated monthly fee".to_string(),
            reassess_overdue: false,
        }
    }
}

pub fn load(conn: &Connection) -> FeeResult<FeeSettings> {
    let stored = db::settings_get_json(conn, FEES_SETTINGS_KEY)
        .map_err(|e| FeeError::Settings(e.to_string()))?;
    match stored {
        Some(v) => serde_json::from_value(v).map_err(|e| FeeError::Settings(e.to_string())),
        None => Ok(FeeSettings::default()),
    }
}

/// Like [`load`], but unreadable stored settings fall back to the defaults so
/// the scheduled jobs keep running.
pub fn load_or_default(conn: &Connection) -> FeeSettings {
    load(conn).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "using default fee settings");
        FeeSettings::default()
    })
}

pub fn save(conn: &Connection, settings: &FeeSettings) -> anyhow::Result<()> {
    db::settings_set_json(conn, FEES_SETTINGS_KEY, &serde_json::to_value(settings)?)
}

fn bad(msg: impl Into<String>) -> FeeError {
    FeeError::Validation(msg.into())
}

fn parse_u32_range(v: &Value, key: &str, min: u32, max: u32) -> FeeResult<u32> {
    let n = v
        .as_u64()
        .ok_or_else(|| bad(format!("{} must be a positive integer", key)))?;
    if n < min as u64 || n > max as u64 {
        return Err(bad(format!("{} must be in {}..={}", key, min, max)));
    }
    Ok(n as u32)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> FeeResult<String> {
    let s = v
        .as_str()
        .ok_or_else(|| bad(format!("{} must be string", key)))?
        .trim();
    if s.is_empty() {
        return Err(bad(format!("{} must not be empty", key)));
    }
    if s.len() > max_len {
        return Err(bad(format!("{} length must be <= {}", key, max_len)));
    }
    Ok(s.to_string())
}

/// Applies a partial update. Unknown keys are rejected so typos surface.
pub fn apply_patch(current: &FeeSettings, patch: &Map<String, Value>) -> FeeResult<FeeSettings> {
    let mut next = current.clone();
    for (k, v) in patch {
        match k.as_str() {
            // Capped at 28 so the default lands inside every month.
            "defaultDueDay" => next.default_due_day = parse_u32_range(v, k, 1, 28)?,
            "receiptPrefix" => {
                let s = parse_string_max(v, k, 12)?.to_ascii_uppercase();
                if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Err(bad("receiptPrefix must be letters and digits only"));
                }
                next.receipt_prefix = s;
            }
            "systemCollectorId" => next.system_collector_id = parse_string_max(v, k, 64)?,
            "autoRemarks" => next.auto_remarks = parse_string_max(v, k, 120)?,
            "reassessOverdue" => {
                next.reassess_overdue = v
                    .as_bool()
                    .ok_or_else(|| bad("reassessOverdue must be boolean"))?;
            }
            _ => return Err(bad(format!("unknown fees setting: {}", k))),
        }
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn defaults_when_nothing_stored() {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("init");
        assert_eq!(load(&conn).expect("load"), FeeSettings::default());
    }

    #[test]
    fn partial_stored_json_keeps_other_defaults() {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("init");
        db::settings_set_json(&conn, FEES_SETTINGS_KEY, &json!({ "receiptPrefix": "SCH" }))
            .expect("set");
        let s = load(&conn).expect("load");
        assert_eq!(s.receipt_prefix, "SCH");
        assert_eq!(s.default_due_day, 10);
    }

    #[test]
    fn corrupt_stored_settings_fall_back_to_defaults() {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("init");
        db::settings_set_json(&conn, FEES_SETTINGS_KEY, &json!({ "defaultDueDay": "tenth" }))
            .expect("set");
        assert!(matches!(load(&conn), Err(FeeError::Settings(_))));
        assert_eq!(load_or_default(&conn), FeeSettings::default());
    }

    #[test]
    fn patch_validates_fields() {
        let base = FeeSettings::default();
        let next = apply_patch(
            &base,
            &patch(json!({ "receiptPrefix": "inv", "defaultDueDay": 5, "reassessOverdue": true })),
        )
        .expect("valid patch");
        assert_eq!(next.receipt_prefix, "INV");
        assert_eq!(next.default_due_day, 5);
        assert!(next.reassess_overdue);

        assert!(apply_patch(&base, &patch(json!({ "defaultDueDay": 31 }))).is_err());
        assert!(apply_patch(&base, &patch(json!({ "receiptPrefix": "A-B" }))).is_err());
        assert!(apply_patch(&base, &patch(json!({ "autoRemarks": "  " }))).is_err());
        assert!(apply_patch(&base, &patch(json!({ "lateFee": 1 }))).is_err());
    }
}
