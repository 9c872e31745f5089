use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use super::{get_optional_str, get_required_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, Roster};

fn parse_population(params: &serde_json::Value) -> Result<Roster, HandlerErr> {
    match params.get("population").and_then(|v| v.as_str()) {
        None | Some("home") => Ok(Roster::Home),
        Some("teaching") => Ok(Roster::Teaching),
        Some(other) => Err(HandlerErr::bad_params(format!(
            "population must be home or teaching, got {:?}",
            other
        ))),
    }
}

fn sections_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let population = parse_population(params)?;
    let sections = ledger::sections(conn, population)?;
    Ok(json!({ "sections": sections }))
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let section = get_required_str(params, "section")?;
    let population = parse_population(params)?;
    let students: Vec<serde_json::Value> = ledger::roster(conn, &section, population)?
        .iter()
        .map(|s| {
            json!({
                "htNumber": s.ht_number,
                "studentName": s.student_name,
                "originalSection": s.original_section,
                "mergedSection": s.merged_section,
            })
        })
        .collect();
    Ok(json!({ "students": students }))
}

fn insert_conflict(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let ht_number = get_required_str(params, "htNumber")?;
    let student_name = get_required_str(params, "studentName")?;
    let original_section = get_required_str(params, "originalSection")?;
    let merged_section = get_optional_str(params, "mergedSection")
        .unwrap_or_else(|| original_section.clone());

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, ht_number, student_name, original_section, merged_section)
         VALUES(?, ?, ?, ?, ?)",
        (&id, &ht_number, &student_name, &original_section, &merged_section),
    )
    .map_err(|e| {
        if insert_conflict(&e) {
            HandlerErr {
                code: "conflict",
                message: format!("student {} already exists", ht_number),
                details: None,
            }
        } else {
            HandlerErr {
                code: "db_update_failed",
                message: e.to_string(),
                details: None,
            }
        }
    })?;
    Ok(json!({ "studentId": id }))
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let ht_number = get_required_str(params, "htNumber")?;
    let patch = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;

    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<String> = Vec::new();
    for (key, column) in [
        ("studentName", "student_name"),
        ("originalSection", "original_section"),
        ("mergedSection", "merged_section"),
    ] {
        if let Some(v) = patch.get(key) {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!("{} must be a string", key)));
            };
            sets.push(column);
            values.push(s.to_string());
        }
    }
    if sets.is_empty() {
        return Err(HandlerErr::bad_params("empty patch"));
    }

    let assignments: Vec<String> = sets.iter().map(|c| format!("{} = ?", c)).collect();
    let sql = format!(
        "UPDATE students SET {} WHERE ht_number = ?",
        assignments.join(", ")
    );
    values.push(ht_number.clone());
    let changed = conn
        .execute(&sql, rusqlite::params_from_iter(values.iter()))
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: None,
        })?;
    if changed == 0 {
        return Err(HandlerErr {
            code: "not_found",
            message: format!("no student with HT number {:?}", ht_number),
            details: None,
        });
    }
    Ok(json!({ "ok": true }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let ht_number = get_required_str(params, "htNumber")?;
    let changed = conn
        .execute("DELETE FROM students WHERE ht_number = ?", [&ht_number])
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: None,
        })?;
    if changed == 0 {
        return Err(HandlerErr {
            code: "not_found",
            message: format!("no student with HT number {:?}", ht_number),
            details: None,
        });
    }
    Ok(json!({ "ok": true }))
}

/// Roster upload. Existing students keep their attendance cells; only the
/// name and section fields are refreshed on re-upload.
fn students_bulk_upload(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(rows) = params.get("rows").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing rows"));
    };

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    let mut processed = 0usize;
    let mut rejections: Vec<serde_json::Value> = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        let ht_number = row.get("htNumber").and_then(|v| v.as_str()).unwrap_or("");
        let student_name = row.get("studentName").and_then(|v| v.as_str()).unwrap_or("");
        let original_section = row
            .get("originalSection")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let merged_section = row
            .get("mergedSection")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(original_section);
        if ht_number.trim().is_empty()
            || student_name.trim().is_empty()
            || original_section.trim().is_empty()
        {
            rejections.push(json!({
                "row": idx,
                "reason": "htNumber, studentName and originalSection are required"
            }));
            continue;
        }
        let res = tx.execute(
            "INSERT INTO students(id, ht_number, student_name, original_section, merged_section)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(ht_number) DO UPDATE SET
               student_name = excluded.student_name,
               original_section = excluded.original_section,
               merged_section = excluded.merged_section",
            (
                Uuid::new_v4().to_string(),
                ht_number,
                student_name,
                original_section,
                merged_section,
            ),
        );
        match res {
            Ok(_) => processed += 1,
            Err(e) => rejections.push(json!({ "row": idx, "reason": e.to_string() })),
        }
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;
    Ok(json!({ "processed": processed, "rejections": rejections }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sections.list" => Some(with_db(state, req, sections_list)),
        "students.list" => Some(with_db(state, req, students_list)),
        "students.create" => Some(with_db(state, req, students_create)),
        "students.update" => Some(with_db(state, req, students_update)),
        "students.delete" => Some(with_db(state, req, students_delete)),
        "students.bulkUpload" => Some(with_db(state, req, students_bulk_upload)),
        _ => None,
    }
}
