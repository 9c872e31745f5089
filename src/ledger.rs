use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

use crate::cell;
use crate::codec::{self, Entry, EncodeError, Status, WorkloadRecord};
use crate::db;
use crate::guard;

pub const PERIODS: [&str; 6] = ["P1", "P2", "P3", "P4", "P5", "P6"];

/// Period labels map to fixed columns; anything else never reaches SQL.
pub fn period_column(period: &str) -> Option<&'static str> {
    match period {
        "P1" => Some("p1"),
        "P2" => Some("p2"),
        "P3" => Some("p3"),
        "P4" => Some("p4"),
        "P5" => Some("p5"),
        "P6" => Some("p6"),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown period label {0:?}")]
    UnknownPeriod(String),
    #[error("no student with HT number {0:?}")]
    StudentNotFound(String),
    #[error("no faculty record for {0:?}")]
    FacultyNotFound(String),
    #[error("invalid date {0:?}, expected DD/MM/YYYY")]
    BadDate(String),
    #[error("invalid time {0:?}, expected H:MMAM or H:MMPM")]
    BadTime(String),
    #[error("no subject mapping for section {0:?}")]
    NoSubjects(String),
    #[error("attendance for {section} {period} on {date} already marked by {recorder}")]
    Duplicate {
        section: String,
        period: String,
        date: String,
        recorder: String,
    },
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("schema error: {0}")]
    Schema(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub ht_number: String,
    pub student_name: String,
    pub original_section: String,
    pub merged_section: String,
}

/// Which section identity a lookup matches: the student's home roster
/// (reporting) or the teaching group they sit in for a period (marking).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Roster {
    Home,
    Teaching,
}

impl Roster {
    fn column(self) -> &'static str {
        match self {
            Roster::Home => "original_section",
            Roster::Teaching => "merged_section",
        }
    }
}

pub fn roster(
    conn: &Connection,
    section: &str,
    population: Roster,
) -> Result<Vec<Student>, LedgerError> {
    let sql = format!(
        "SELECT ht_number, student_name, original_section, merged_section
         FROM students WHERE {} = ? ORDER BY ht_number",
        population.column()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([section], |r| {
            Ok(Student {
                ht_number: r.get(0)?,
                student_name: r.get(1)?,
                original_section: r.get(2)?,
                merged_section: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn sections(conn: &Connection, population: Roster) -> Result<Vec<String>, LedgerError> {
    let sql = format!(
        "SELECT DISTINCT {col} FROM students WHERE TRIM({col}) <> '' ORDER BY {col}",
        col = population.column()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_cell(conn: &Connection, ht_number: &str, period: &str) -> Result<String, LedgerError> {
    let col = period_column(period).ok_or_else(|| LedgerError::UnknownPeriod(period.to_string()))?;
    let sql = format!("SELECT {} FROM students WHERE ht_number = ?", col);
    conn.query_row(&sql, [ht_number], |r| r.get::<_, String>(0))
        .optional()?
        .ok_or_else(|| LedgerError::StudentNotFound(ht_number.to_string()))
}

pub fn set_cell(
    conn: &Connection,
    ht_number: &str,
    period: &str,
    text: &str,
) -> Result<(), LedgerError> {
    let col = period_column(period).ok_or_else(|| LedgerError::UnknownPeriod(period.to_string()))?;
    let sql = format!("UPDATE students SET {} = ? WHERE ht_number = ?", col);
    let changed = conn.execute(&sql, (text, ht_number))?;
    if changed == 0 {
        return Err(LedgerError::StudentNotFound(ht_number.to_string()));
    }
    Ok(())
}

/// Subjects mapped to a section, in mapping order. The mapping table is keyed
/// by teaching section; a home-section query resolves through the teaching
/// section of any member student first, the way the legacy register did.
pub fn section_subjects(conn: &Connection, section: &str) -> Result<Vec<String>, LedgerError> {
    if let Some(subjects) = mapping_row(conn, section)? {
        return Ok(subjects);
    }
    let merged: Option<String> = conn
        .query_row(
            "SELECT merged_section FROM students WHERE original_section = ? LIMIT 1",
            [section],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(merged) = merged {
        if let Some(subjects) = mapping_row(conn, &merged)? {
            return Ok(subjects);
        }
    }
    Err(LedgerError::NoSubjects(section.to_string()))
}

fn mapping_row(conn: &Connection, section: &str) -> Result<Option<Vec<String>>, LedgerError> {
    let names: Option<String> = conn
        .query_row(
            "SELECT subject_names FROM section_subjects WHERE section = ?",
            [section],
            |r| r.get(0),
        )
        .optional()?;
    Ok(names.map(|s| {
        s.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }))
}

#[derive(Debug, Clone)]
pub struct MarkRequest {
    /// Teaching section the class was held for.
    pub section: String,
    pub period: String,
    pub subject: String,
    /// Faculty display name; must exist in the faculty table.
    pub recorder: String,
    pub date: String,
    pub time: String,
    pub note: Option<String>,
    pub assignments: Vec<(String, Status)>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Rejection {
    #[serde(rename = "htNumber")]
    pub ht_number: String,
    #[serde(rename = "studentName")]
    pub student_name: String,
    #[serde(rename = "originalSection")]
    pub original_section: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct MarkOutcome {
    pub accepted: usize,
    pub rejections: Vec<Rejection>,
}

/// Appends one entry per assignment and one workload token to the recorder's
/// month log, all inside a single transaction. Per-student failures become
/// rejections; the guard, recorder lookup, and stamp validation run before
/// anything is written.
pub fn mark(conn: &Connection, req: &MarkRequest) -> Result<MarkOutcome, LedgerError> {
    let col =
        period_column(&req.period).ok_or_else(|| LedgerError::UnknownPeriod(req.period.clone()))?;
    let date = codec::parse_date(&req.date).ok_or_else(|| LedgerError::BadDate(req.date.clone()))?;
    codec::parse_time(&req.time).ok_or_else(|| LedgerError::BadTime(req.time.clone()))?;

    let dup = guard::check(conn, &req.section, &req.period, &req.date);
    if dup.duplicate {
        return Err(LedgerError::Duplicate {
            section: req.section.clone(),
            period: req.period.clone(),
            date: dup.date.unwrap_or_else(|| req.date.clone()),
            recorder: dup.recorder.unwrap_or_else(|| "another faculty".to_string()),
        });
    }

    let recorder: Option<String> = conn
        .query_row(
            "SELECT faculty_name FROM faculty WHERE faculty_name = ?",
            [&req.recorder],
            |r| r.get(0),
        )
        .optional()?;
    let Some(recorder) = recorder else {
        return Err(LedgerError::FacultyNotFound(req.recorder.clone()));
    };

    // Validate the token once up front so a collision in subject or recorder
    // rejects the whole batch instead of half of it.
    let probe = Entry {
        date: req.date.clone(),
        time: req.time.clone(),
        status: Status::Present,
        recorder: recorder.clone(),
        subject: req.subject.clone(),
        note: req.note.clone(),
    };
    probe.encode()?;

    let month = codec::month_key(date);
    db::ensure_month_column(conn, &month).map_err(|e| LedgerError::Schema(e.to_string()))?;

    let tx = conn.unchecked_transaction()?;
    let mut accepted = 0usize;
    let mut rejections = Vec::new();

    for (ht_number, status) in &req.assignments {
        let row: Option<(String, String, String)> = tx
            .query_row(
                &format!(
                    "SELECT student_name, original_section, {} FROM students WHERE ht_number = ?",
                    col
                ),
                [ht_number],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((student_name, original_section, old_cell)) = row else {
            rejections.push(Rejection {
                ht_number: ht_number.clone(),
                student_name: "Unknown".to_string(),
                original_section: "Unknown".to_string(),
                reason: "student not found".to_string(),
            });
            continue;
        };

        let entry = Entry {
            status: *status,
            ..probe.clone()
        };
        let new_cell = cell::append(&old_cell, &entry)?;
        match tx.execute(
            &format!("UPDATE students SET {} = ? WHERE ht_number = ?", col),
            (&new_cell, ht_number),
        ) {
            Ok(_) => accepted += 1,
            Err(e) => rejections.push(Rejection {
                ht_number: ht_number.clone(),
                student_name,
                original_section,
                reason: format!("write failed: {}", e),
            }),
        }
    }

    if accepted > 0 {
        let record = WorkloadRecord {
            date: req.date.clone(),
            time: req.time.clone(),
            period: req.period.clone(),
            subject: req.subject.clone(),
            section: req.section.clone(),
            note: req.note.clone(),
        };
        append_workload(&tx, &recorder, &month, &record)?;
    }

    tx.commit()?;
    tracing::info!(
        section = %req.section,
        period = %req.period,
        accepted,
        rejected = rejections.len(),
        "attendance marked"
    );
    Ok(MarkOutcome {
        accepted,
        rejections,
    })
}

fn append_workload(
    conn: &Connection,
    faculty_name: &str,
    month: &str,
    record: &WorkloadRecord,
) -> Result<(), LedgerError> {
    let token = record.encode()?;
    let sql = format!(
        "SELECT \"{}\" FROM faculty WHERE faculty_name = ?",
        month
    );
    let current: String = conn
        .query_row(&sql, [faculty_name], |r| r.get(0))
        .optional()?
        .ok_or_else(|| LedgerError::FacultyNotFound(faculty_name.to_string()))?;
    let updated = if current.trim().is_empty() {
        token
    } else {
        format!("{}\n{}", current.trim_end_matches('\n'), token)
    };
    let sql = format!(
        "UPDATE faculty SET \"{}\" = ? WHERE faculty_name = ?",
        month
    );
    conn.execute(&sql, (&updated, faculty_name))?;
    Ok(())
}
