#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_feeledgerd");
    let mut child = Command::new(exe)
        .env_remove("FEELEDGER_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn feeledgerd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

/// Runs a one-shot CLI job against `workspace`.
pub fn run_cli(workspace: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_feeledgerd"))
        .arg("--workspace")
        .arg(workspace)
        .args(args)
        .env_remove("FEELEDGER_WORKSPACE")
        .output()
        .expect("run feeledgerd")
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(Value::Null)
}

pub fn error_code(value: &Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

pub fn str_field(value: &Value, path: &[&str]) -> String {
    let mut cur = value;
    for key in path {
        cur = cur.get(*key).unwrap_or_else(|| panic!("missing {} in {}", key, value));
    }
    cur.as_str().expect("string field").to_string()
}

/// Ids of the reference rows created by [`seed_school`].
pub struct School {
    pub year_id: String,
    pub class_id: String,
    pub tuition_id: String,
    pub student_id: String,
}

/// Opens `workspace` and creates a current 2024 year, one class with one
/// active student, and a monthly tuition structure of 1000 due on the 10th
/// with a 100 late fee after a 3 day grace period.
pub fn seed_school(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) -> School {
    let _ = request_ok(
        stdin,
        reader,
        "seed-1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let year = request_ok(
        stdin,
        reader,
        "seed-2",
        "academicYears.create",
        json!({
            "name": "2024",
            "startDate": "2024-01-01",
            "endDate": "2024-12-31",
            "makeCurrent": true
        }),
    );
    let year_id = str_field(&year, &["academicYear", "id"]);
    let class = request_ok(stdin, reader, "seed-3", "classes.create", json!({ "name": "Grade 5" }));
    let class_id = str_field(&class, &["classId"]);
    let tuition = request_ok(
        stdin,
        reader,
        "seed-4",
        "feeTypes.create",
        json!({ "name": "Tuition", "frequency": "monthly" }),
    );
    let tuition_id = str_field(&tuition, &["feeType", "id"]);
    let _ = request_ok(
        stdin,
        reader,
        "seed-5",
        "feeStructures.create",
        json!({
            "classId": class_id,
            "feeTypeId": tuition_id,
            "academicYearId": year_id,
            "amount": "1000",
            "dueDay": 10,
            "lateFee": "100",
            "lateFeeDays": 3
        }),
    );
    let student = request_ok(
        stdin,
        reader,
        "seed-6",
        "students.create",
        json!({ "classId": class_id, "academicYearId": year_id, "name": "Asha" }),
    );
    let student_id = str_field(&student, &["student", "id"]);
    School {
        year_id,
        class_id,
        tuition_id,
        student_id,
    }
}
