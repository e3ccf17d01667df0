use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    get_opt_bool, get_opt_decimal, get_opt_i64, get_opt_str, get_opt_u32, get_required_date,
    get_required_decimal, get_required_str, require_db,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{FeeFrequency, StudentStatus};
use crate::reference::{self, NewFeeStructure};
use serde_json::{json, Value};
use std::str::FromStr;

type HandlerResult = Result<Value, HandlerErr>;

fn academic_years_create(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let name = get_required_str(params, "name")?;
    let start = get_required_date(params, "startDate")?;
    let end = get_required_date(params, "endDate")?;
    let mut year = reference::create_academic_year(conn, &name, start, end)?;
    if get_opt_bool(params, "makeCurrent")?.unwrap_or(false) {
        year = reference::set_current_academic_year(conn, &year.id)?;
    }
    Ok(json!({ "academicYear": year }))
}

fn academic_years_list(state: &AppState) -> HandlerResult {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "academicYears": [] }));
    };
    Ok(json!({ "academicYears": reference::list_academic_years(conn)? }))
}

fn academic_years_set_current(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let id = get_required_str(params, "academicYearId")?;
    Ok(json!({ "academicYear": reference::set_current_academic_year(conn, &id)? }))
}

fn academic_years_close(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let id = get_required_str(params, "academicYearId")?;
    Ok(json!({ "academicYear": reference::close_academic_year(conn, &id)? }))
}

fn classes_create(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let name = get_required_str(params, "name")?;
    let class = reference::create_class(conn, &name)?;
    Ok(json!({ "classId": class.id, "name": class.name }))
}

fn classes_list(state: &AppState) -> HandlerResult {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "classes": [] }));
    };
    Ok(json!({ "classes": reference::list_classes(conn)? }))
}

fn parse_student_status(params: &Value) -> Result<Option<StudentStatus>, HandlerErr> {
    get_opt_str(params, "status")?
        .map(|s| StudentStatus::from_str(&s))
        .transpose()
        .map_err(HandlerErr::from)
}

fn students_create(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let class_id = get_required_str(params, "classId")?;
    let year_id = get_required_str(params, "academicYearId")?;
    let name = get_required_str(params, "name")?;
    let status = parse_student_status(params)?.unwrap_or(StudentStatus::Active);
    let student = reference::create_student(conn, &class_id, &year_id, &name, status)?;
    Ok(json!({ "student": student }))
}

fn students_list(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let class_id = get_opt_str(params, "classId")?;
    let year_id = get_opt_str(params, "academicYearId")?;
    let students = reference::list_students(conn, class_id.as_deref(), year_id.as_deref())?;
    Ok(json!({ "students": students }))
}

fn students_set_status(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let id = get_required_str(params, "studentId")?;
    let status = parse_student_status(params)?
        .ok_or_else(|| HandlerErr::bad_params("missing status"))?;
    Ok(json!({ "student": reference::set_student_status(conn, &id, status)? }))
}

fn students_delete(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let id = get_required_str(params, "studentId")?;
    reference::delete_student(conn, &id)?;
    Ok(json!({ "ok": true }))
}

fn fee_types_create(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let name = get_required_str(params, "name")?;
    let frequency = FeeFrequency::from_str(&get_required_str(params, "frequency")?)?;
    Ok(json!({ "feeType": reference::create_fee_type(conn, &name, frequency)? }))
}

fn fee_types_list(state: &AppState) -> HandlerResult {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "feeTypes": [] }));
    };
    Ok(json!({ "feeTypes": reference::list_fee_types(conn)? }))
}

fn fee_structures_create(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let new = NewFeeStructure {
        class_id: get_required_str(params, "classId")?,
        fee_type_id: get_required_str(params, "feeTypeId")?,
        academic_year_id: get_required_str(params, "academicYearId")?,
        amount: get_required_decimal(params, "amount")?,
        due_day: get_opt_u32(params, "dueDay")?,
        late_fee: get_opt_decimal(params, "lateFee")?,
        late_fee_days: get_opt_i64(params, "lateFeeDays")?,
    };
    Ok(json!({ "feeStructure": reference::create_fee_structure(conn, new)? }))
}

fn fee_structures_list(state: &AppState, params: &Value) -> HandlerResult {
    let conn = require_db(state)?;
    let class_id = get_opt_str(params, "classId")?;
    let year_id = get_opt_str(params, "academicYearId")?;
    let rows = reference::list_fee_structures(conn, class_id.as_deref(), year_id.as_deref())?;
    Ok(json!({ "feeStructures": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "academicYears.create" => academic_years_create(state, p),
        "academicYears.list" => academic_years_list(state),
        "academicYears.setCurrent" => academic_years_set_current(state, p),
        "academicYears.close" => academic_years_close(state, p),
        "classes.create" => classes_create(state, p),
        "classes.list" => classes_list(state),
        "students.create" => students_create(state, p),
        "students.list" => students_list(state, p),
        "students.setStatus" => students_set_status(state, p),
        "students.delete" => students_delete(state, p),
        "feeTypes.create" => fee_types_create(state, p),
        "feeTypes.list" => fee_types_list(state),
        "feeStructures.create" => fee_structures_create(state, p),
        "feeStructures.list" => fee_structures_list(state, p),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
