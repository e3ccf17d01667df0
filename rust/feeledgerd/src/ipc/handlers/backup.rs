use crate::backup;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::get_required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::PathBuf;

fn require_workspace(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state
        .workspace
        .clone()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn backup_export(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let workspace = require_workspace(state)?;
    let out_path = PathBuf::from(get_required_str(params, "outPath")?);
    let summary = backup::export_workspace_bundle(&workspace, &out_path)
        .map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")))?;
    tracing::info!(out = %out_path.display(), bytes = summary.db_bytes, "workspace exported");
    Ok(json!({
        "ok": true,
        "path": out_path.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "dbSha256": summary.db_sha256,
        "dbBytes": summary.db_bytes,
    }))
}

fn backup_import(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let workspace = require_workspace(state)?;
    let in_path = PathBuf::from(get_required_str(params, "inPath")?);

    // The live connection must be closed before its file is replaced.
    state.db = None;
    let imported = backup::import_workspace_bundle(&in_path, &workspace);
    let conn = db::open_db(&workspace)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:?}")))?;
    state.db = Some(conn);

    let summary = imported.map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")))?;
    tracing::info!(
        source = %in_path.display(),
        format = %summary.bundle_format_detected,
        "workspace imported"
    );
    Ok(json!({
        "ok": true,
        "workspacePath": workspace.to_string_lossy(),
        "bundleFormatDetected": summary.bundle_format_detected,
        "dbSha256": summary.db_sha256,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "backup.export" => backup_export(state, &req.params),
        "backup.import" => backup_import(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
