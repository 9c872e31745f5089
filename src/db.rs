use rusqlite::Connection;
use std::path::Path;

use crate::codec;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("ledger.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Mirrors the legacy workbook's unified "Students" sheet: one row per
    // student, one TEXT column per period holding the newline-joined entry log.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            ht_number TEXT NOT NULL UNIQUE,
            student_name TEXT NOT NULL,
            original_section TEXT NOT NULL,
            merged_section TEXT NOT NULL,
            p1 TEXT NOT NULL DEFAULT '',
            p2 TEXT NOT NULL DEFAULT '',
            p3 TEXT NOT NULL DEFAULT '',
            p4 TEXT NOT NULL DEFAULT '',
            p5 TEXT NOT NULL DEFAULT '',
            p6 TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_original ON students(original_section)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_merged ON students(merged_section)",
        [],
    )?;

    // The "Faculty" sheet. Month columns (e.g. "Dec2024") are added on demand
    // by ensure_month_column; credentials are stored for workbook parity only.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS faculty(
            id TEXT PRIMARY KEY,
            faculty_name TEXT NOT NULL UNIQUE,
            username TEXT,
            password TEXT
        )",
        [],
    )?;

    // The "Section-Subject-Mapping" sheet, keyed by teaching section.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS section_subjects(
            section TEXT PRIMARY KEY,
            subject_names TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// Adds the workload column for a month if this workspace has not seen that
/// month yet. The key shape is validated because it lands in an identifier.
pub fn ensure_month_column(conn: &Connection, month: &str) -> anyhow::Result<()> {
    if !codec::is_month_key(month) {
        anyhow::bail!("invalid month key: {month:?}");
    }
    if table_has_column(conn, "faculty", month)? {
        return Ok(());
    }
    let sql = format!(
        "ALTER TABLE faculty ADD COLUMN \"{}\" TEXT NOT NULL DEFAULT ''",
        month
    );
    conn.execute(&sql, [])?;
    Ok(())
}

/// All month columns present on the faculty table, in the order they were
/// added. Workload scans iterate these instead of assuming a date window.
pub fn month_columns(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA table_info(faculty)")?;
    let mut rows = stmt.query([])?;
    let mut cols = Vec::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if codec::is_month_key(&name) {
            cols.push(name);
        }
    }
    Ok(cols)
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
