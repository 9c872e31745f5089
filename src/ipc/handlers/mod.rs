pub mod attendance;
pub mod core;
pub mod reports;
pub mod roster;
pub mod setup;

use rusqlite::Connection;
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger::LedgerError;

pub(crate) struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }
}

impl From<LedgerError> for HandlerErr {
    fn from(e: LedgerError) -> Self {
        let code = match &e {
            LedgerError::UnknownPeriod(_)
            | LedgerError::BadDate(_)
            | LedgerError::BadTime(_)
            | LedgerError::Encode(_) => "bad_params",
            LedgerError::StudentNotFound(_)
            | LedgerError::FacultyNotFound(_)
            | LedgerError::NoSubjects(_) => "not_found",
            LedgerError::Duplicate {
                recorder, date, ..
            } => {
                return HandlerErr {
                    code: "duplicate_attendance",
                    message: e.to_string(),
                    details: Some(json!({ "recorder": recorder, "date": date })),
                }
            }
            LedgerError::Storage(_) => "db_query_failed",
            LedgerError::Schema(_) => "db_update_failed",
        };
        HandlerErr {
            code,
            message: e.to_string(),
            details: None,
        }
    }
}

pub(crate) fn get_required_str(
    params: &serde_json::Value,
    key: &str,
) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub(crate) fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn with_db<F>(state: &mut AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}
