use rusqlite::Connection;
use serde_json::json;

use super::{get_optional_str, get_required_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::stats::{self, DateRange};

fn parse_range(params: &serde_json::Value) -> Result<DateRange, HandlerErr> {
    let from = get_optional_str(params, "fromDate");
    let to = get_optional_str(params, "toDate");
    Ok(DateRange::parse(from.as_deref(), to.as_deref())?)
}

fn to_value<T: serde::Serialize>(v: &T) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(v).map_err(|e| HandlerErr {
        code: "serialize_failed",
        message: e.to_string(),
        details: None,
    })
}

fn section_stats(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let section = get_required_str(params, "section")?;
    let range = parse_range(params)?;
    let rows = stats::section_stats(conn, &section, range)?;
    Ok(json!({ "section": section, "students": to_value(&rows)? }))
}

fn subject_breakdown(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let section = get_required_str(params, "section")?;
    let subject = get_required_str(params, "subject")?;
    let range = parse_range(params)?;
    let rows = stats::subject_breakdown(conn, &section, &subject, range)?;
    Ok(json!({
        "section": section,
        "subject": subject,
        "students": to_value(&rows)?,
    }))
}

fn student_details(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let ht_number = get_required_str(params, "htNumber")?;
    let rows = stats::student_details(conn, &ht_number)?;
    Ok(json!({ "htNumber": ht_number, "entries": to_value(&rows)? }))
}

fn faculty_workload(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let faculty_name = get_required_str(params, "facultyName")?;
    let range = parse_range(params)?;
    let workload = stats::faculty_workload(conn, &faculty_name, range)?;
    to_value(&workload)
}

fn faculty_workload_all(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let range = parse_range(params)?;
    let workloads = stats::all_faculty_workload(conn, range)?;
    Ok(json!({ "faculty": to_value(&workloads)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.sectionStats" => Some(with_db(state, req, section_stats)),
        "reports.subjectBreakdown" => Some(with_db(state, req, subject_breakdown)),
        "reports.studentDetails" => Some(with_db(state, req, student_details)),
        "reports.facultyWorkload" => Some(with_db(state, req, faculty_workload)),
        "reports.facultyWorkloadAll" => Some(with_db(state, req, faculty_workload_all)),
        _ => None,
    }
}
