use rusqlite::Connection;

use crate::cell;
use crate::ledger::period_column;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DuplicateCheck {
    pub duplicate: bool,
    pub recorder: Option<String>,
    pub date: Option<String>,
}

/// One mark per (teaching section, period, date): scans the teaching roster's
/// cells for that period and reports the first entry on the same date. A
/// failed scan blocks the mark rather than risking a double entry.
pub fn check(conn: &Connection, section: &str, period: &str, date: &str) -> DuplicateCheck {
    match scan(conn, section, period, date) {
        Ok(found) => found,
        Err(err) => {
            tracing::warn!(%err, section, period, "duplicate scan failed, blocking mark");
            DuplicateCheck {
                duplicate: true,
                recorder: None,
                date: None,
            }
        }
    }
}

fn scan(
    conn: &Connection,
    section: &str,
    period: &str,
    date: &str,
) -> anyhow::Result<DuplicateCheck> {
    let Some(col) = period_column(period) else {
        anyhow::bail!("unknown period label {period:?}");
    };
    let sql = format!("SELECT {} FROM students WHERE merged_section = ?", col);
    let mut stmt = conn.prepare(&sql)?;
    let cells = stmt
        .query_map([section], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    for text in cells {
        for entry in cell::read(&text) {
            if entry.date == date {
                return Ok(DuplicateCheck {
                    duplicate: true,
                    recorder: Some(entry.recorder),
                    date: Some(entry.date),
                });
            }
        }
    }
    Ok(DuplicateCheck::default())
}
