use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::settings;
use serde_json::{json, Value};

const SECTIONS: &[&str] = &["fees"];

fn require_section(params: &Value) -> Result<String, HandlerErr> {
    let section = get_required_str(params, "section")?;
    if !SECTIONS.contains(&section.as_str()) {
        return Err(HandlerErr::bad_params(format!(
            "unknown settings section: {}",
            section
        )));
    }
    Ok(section)
}

fn settings_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let section = require_section(params)?;
    let current = settings::load(conn)?;
    Ok(json!({ "section": section, "settings": current }))
}

fn settings_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let section = require_section(params)?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    let current = settings::load(conn)?;
    let next = settings::apply_patch(&current, patch)?;
    settings::save(conn, &next)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    tracing::info!(section = %section, keys = patch.len(), "settings updated");
    Ok(json!({ "section": section, "settings": next }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "settings.get" => settings_get(state, &req.params),
        "settings.update" => settings_update(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
