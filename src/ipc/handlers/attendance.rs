use chrono::Local;
use rusqlite::Connection;
use serde_json::json;

use super::{get_optional_str, get_required_str, with_db, HandlerErr};
use crate::codec::{self, Status};
use crate::guard;
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, MarkRequest};

fn parse_assignments(params: &serde_json::Value) -> Result<Vec<(String, Status)>, HandlerErr> {
    let Some(map) = params.get("assignments").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing assignments"));
    };
    if map.is_empty() {
        return Err(HandlerErr::bad_params("assignments must not be empty"));
    }
    let mut out = Vec::with_capacity(map.len());
    for (ht_number, status) in map {
        let Some(s) = status.as_str() else {
            return Err(HandlerErr::bad_params(format!(
                "status for {} must be \"P\" or \"A\"",
                ht_number
            )));
        };
        let status = Status::parse(s).map_err(|_| {
            HandlerErr::bad_params(format!("status for {} must be \"P\" or \"A\"", ht_number))
        })?;
        out.push((ht_number.clone(), status));
    }
    Ok(out)
}

fn attendance_mark(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let now = Local::now();
    let req = MarkRequest {
        section: get_required_str(params, "section")?,
        period: get_required_str(params, "period")?,
        subject: get_required_str(params, "subject")?,
        recorder: get_required_str(params, "recorder")?,
        date: get_optional_str(params, "date")
            .unwrap_or_else(|| codec::format_date(now.date_naive())),
        time: get_optional_str(params, "time").unwrap_or_else(|| codec::format_time(now.time())),
        note: get_optional_str(params, "lessonNote"),
        assignments: parse_assignments(params)?,
    };

    let outcome = ledger::mark(conn, &req)?;
    Ok(json!({
        "accepted": outcome.accepted,
        "rejections": outcome.rejections,
    }))
}

fn attendance_check_duplicate(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let section = get_required_str(params, "section")?;
    let period = get_required_str(params, "period")?;
    let date = get_required_str(params, "date")?;

    let check = guard::check(conn, &section, &period, &date);
    Ok(json!({
        "duplicate": check.duplicate,
        "recorder": check.recorder,
        "date": check.date,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(with_db(state, req, attendance_mark)),
        "attendance.checkDuplicate" => Some(with_db(state, req, attendance_check_duplicate)),
        _ => None,
    }
}
