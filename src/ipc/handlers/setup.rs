use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use super::{get_optional_str, get_required_str, with_db, HandlerErr};
use crate::codec::DELIM;
use crate::ipc::types::{AppState, Request};
use crate::ledger;

fn mapping_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let section = get_required_str(params, "section")?;
    let subjects = ledger::section_subjects(conn, &section)?;
    Ok(json!({ "section": section, "subjects": subjects }))
}

fn mapping_set(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let section = get_required_str(params, "section")?;
    let Some(raw) = params.get("subjects").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing subjects"));
    };
    let mut subjects: Vec<String> = Vec::with_capacity(raw.len());
    for v in raw {
        let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return Err(HandlerErr::bad_params("subjects must be non-empty strings"));
        };
        // Subject names end up inside delimited tokens; reject collisions at
        // the source instead of at every mark.
        if s.contains(DELIM) || s.contains('\n') {
            return Err(HandlerErr::bad_params(format!(
                "subject {:?} contains a reserved character",
                s
            )));
        }
        subjects.push(s.to_string());
    }
    if subjects.is_empty() {
        return Err(HandlerErr::bad_params("subjects must not be empty"));
    }

    conn.execute(
        "INSERT INTO section_subjects(section, subject_names) VALUES(?, ?)
         ON CONFLICT(section) DO UPDATE SET subject_names = excluded.subject_names",
        (&section, subjects.join("\n")),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: None,
    })?;
    Ok(json!({ "ok": true }))
}

fn faculty_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let faculty_name = get_required_str(params, "facultyName")?;
    if faculty_name.contains(DELIM) || faculty_name.contains('\n') {
        return Err(HandlerErr::bad_params(
            "faculty name contains a reserved character",
        ));
    }
    let username = get_optional_str(params, "username");
    let password = get_optional_str(params, "password");

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO faculty(id, faculty_name, username, password) VALUES(?, ?, ?, ?)",
        (&id, &faculty_name, &username, &password),
    )
    .map_err(|e| {
        if matches!(
            e.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        ) {
            HandlerErr {
                code: "conflict",
                message: format!("faculty {:?} already exists", faculty_name),
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
    Ok(json!({ "facultyId": id }))
}

fn faculty_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT faculty_name FROM faculty ORDER BY faculty_name")
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    Ok(json!({ "faculty": names }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "mapping.get" => Some(with_db(state, req, mapping_get)),
        "mapping.set" => Some(with_db(state, req, mapping_set)),
        "faculty.create" => Some(with_db(state, req, faculty_create)),
        "faculty.list" => Some(with_db(state, req, faculty_list)),
        _ => None,
    }
}
