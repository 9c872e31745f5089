use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::cell;
use crate::codec::{self, Status, WorkloadRecord};
use crate::db;
use crate::ledger::{self, LedgerError, Roster, PERIODS};

/// Inclusive date window. Open bounds pass everything on that side.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<DateRange, LedgerError> {
        let parse_bound = |s: Option<&str>| -> Result<Option<NaiveDate>, LedgerError> {
            match s {
                None => Ok(None),
                Some(raw) => codec::parse_date(raw)
                    .map(Some)
                    .ok_or_else(|| LedgerError::BadDate(raw.to_string())),
            }
        };
        Ok(DateRange {
            from: parse_bound(from)?,
            to: parse_bound(to)?,
        })
    }

    pub fn contains(&self, d: NaiveDate) -> bool {
        if let Some(from) = self.from {
            if d < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if d > to {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectCount {
    pub subject: String,
    pub attended: u32,
    pub conducted: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentStat {
    #[serde(rename = "htNumber")]
    pub ht_number: String,
    #[serde(rename = "studentName")]
    pub student_name: String,
    pub subjects: Vec<SubjectCount>,
    #[serde(rename = "totalAttended")]
    pub total_attended: u32,
    #[serde(rename = "totalConducted")]
    pub total_conducted: u32,
    #[serde(rename = "overallPct")]
    pub overall_pct: f64,
}

/// Attended/conducted per mapped subject for every student on the section's
/// home roster. Entries with unparseable dates, unmapped subjects, or dates
/// outside the window are ignored. A student who attended nothing still
/// appears, with an overall percentage of zero.
pub fn section_stats(
    conn: &Connection,
    section: &str,
    range: DateRange,
) -> Result<Vec<StudentStat>, LedgerError> {
    let subjects = ledger::section_subjects(conn, section)?;
    let students = ledger::roster(conn, section, Roster::Home)?;

    let mut out = Vec::with_capacity(students.len());
    for student in &students {
        let mut counts: Vec<SubjectCount> = subjects
            .iter()
            .map(|s| SubjectCount {
                subject: s.clone(),
                attended: 0,
                conducted: 0,
            })
            .collect();

        for period in PERIODS {
            let text = ledger::get_cell(conn, &student.ht_number, period)?;
            for entry in cell::read(&text) {
                let Some(date) = codec::parse_date(&entry.date) else {
                    continue;
                };
                if !range.contains(date) {
                    continue;
                }
                let Some(count) = counts.iter_mut().find(|c| c.subject == entry.subject) else {
                    continue;
                };
                count.conducted += 1;
                if entry.status == Status::Present {
                    count.attended += 1;
                }
            }
        }

        let total_attended: u32 = counts.iter().map(|c| c.attended).sum();
        let total_conducted: u32 = counts.iter().map(|c| c.conducted).sum();
        let overall_pct = if total_conducted > 0 {
            round2(100.0 * total_attended as f64 / total_conducted as f64)
        } else {
            0.0
        };
        out.push(StudentStat {
            ht_number: student.ht_number.clone(),
            student_name: student.student_name.clone(),
            subjects: counts,
            total_attended,
            total_conducted,
            overall_pct,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectRow {
    #[serde(rename = "htNumber")]
    pub ht_number: String,
    #[serde(rename = "studentName")]
    pub student_name: String,
    #[serde(rename = "originalSection")]
    pub original_section: String,
    pub attended: u32,
    pub conducted: u32,
    pub pct: f64,
}

/// One subject across the teaching roster. Students with no conducted class
/// for the subject are left out, the policy carried over from the register.
pub fn subject_breakdown(
    conn: &Connection,
    section: &str,
    subject: &str,
    range: DateRange,
) -> Result<Vec<SubjectRow>, LedgerError> {
    let students = ledger::roster(conn, section, Roster::Teaching)?;
    let mut out = Vec::new();
    for student in &students {
        let mut attended = 0u32;
        let mut conducted = 0u32;
        for period in PERIODS {
            let text = ledger::get_cell(conn, &student.ht_number, period)?;
            for entry in cell::read(&text) {
                if entry.subject != subject {
                    continue;
                }
                let Some(date) = codec::parse_date(&entry.date) else {
                    continue;
                };
                if !range.contains(date) {
                    continue;
                }
                conducted += 1;
                if entry.status == Status::Present {
                    attended += 1;
                }
            }
        }
        if conducted == 0 {
            continue;
        }
        out.push(SubjectRow {
            ht_number: student.ht_number.clone(),
            student_name: student.student_name.clone(),
            original_section: student.original_section.clone(),
            attended,
            conducted,
            pct: round2(100.0 * attended as f64 / conducted as f64),
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailRow {
    pub period: String,
    pub date: String,
    pub time: String,
    pub status: String,
    pub recorder: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Full decoded history for one student, period by period in marking order.
pub fn student_details(conn: &Connection, ht_number: &str) -> Result<Vec<DetailRow>, LedgerError> {
    let mut out = Vec::new();
    for period in PERIODS {
        let text = ledger::get_cell(conn, ht_number, period)?;
        for entry in cell::read(&text) {
            out.push(DetailRow {
                period: period.to_string(),
                date: entry.date,
                time: entry.time,
                status: entry.status.as_str().to_string(),
                recorder: entry.recorder,
                subject: entry.subject,
                note: entry.note,
            });
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassRecord {
    pub date: String,
    pub time: String,
    pub period: String,
    pub subject: String,
    pub section: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub month: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadSummary {
    #[serde(rename = "totalClasses")]
    pub total_classes: usize,
    #[serde(rename = "daysEngaged")]
    pub days_engaged: usize,
    #[serde(rename = "dailyAverage")]
    pub daily_average: f64,
    #[serde(rename = "uniqueSubjects")]
    pub unique_subjects: usize,
    #[serde(rename = "uniqueSections")]
    pub unique_sections: usize,
    #[serde(rename = "subjectDistribution")]
    pub subject_distribution: BTreeMap<String, usize>,
    #[serde(rename = "sectionDistribution")]
    pub section_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacultyWorkload {
    #[serde(rename = "facultyName")]
    pub faculty_name: String,
    pub records: Vec<ClassRecord>,
    pub summary: WorkloadSummary,
}

/// Workload for one faculty member, parsed from every month column of their
/// row. Records come back newest-first.
pub fn faculty_workload(
    conn: &Connection,
    faculty_name: &str,
    range: DateRange,
) -> Result<FacultyWorkload, LedgerError> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT faculty_name FROM faculty WHERE faculty_name = ?",
            [faculty_name],
            |r| r.get(0),
        )
        .optional()?;
    let Some(name) = exists else {
        return Err(LedgerError::FacultyNotFound(faculty_name.to_string()));
    };
    let records = collect_workload(conn, &name, range)?;
    let summary = summarize(&records);
    Ok(FacultyWorkload {
        faculty_name: name,
        records,
        summary,
    })
}

/// Workload for every faculty member; rows with no matching classes are
/// skipped, as the register's admin view did.
pub fn all_faculty_workload(
    conn: &Connection,
    range: DateRange,
) -> Result<Vec<FacultyWorkload>, LedgerError> {
    let mut stmt = conn.prepare("SELECT faculty_name FROM faculty ORDER BY faculty_name")?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::new();
    for name in names {
        let records = collect_workload(conn, &name, range)?;
        if records.is_empty() {
            continue;
        }
        let summary = summarize(&records);
        out.push(FacultyWorkload {
            faculty_name: name,
            records,
            summary,
        });
    }
    Ok(out)
}

fn collect_workload(
    conn: &Connection,
    faculty_name: &str,
    range: DateRange,
) -> Result<Vec<ClassRecord>, LedgerError> {
    let mut dated: Vec<(NaiveDate, ClassRecord)> = Vec::new();
    for month in db::month_columns(conn).map_err(|e| LedgerError::Schema(e.to_string()))? {
        let sql = format!("SELECT \"{}\" FROM faculty WHERE faculty_name = ?", month);
        let text: Option<String> = conn
            .query_row(&sql, [faculty_name], |r| r.get(0))
            .optional()?;
        let Some(text) = text else {
            continue;
        };
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let record = match WorkloadRecord::decode(line) {
                Ok(r) => r,
                Err(err) => {
                    tracing::debug!(line, %err, "skipping malformed workload token");
                    continue;
                }
            };
            let Some(date) = codec::parse_date(&record.date) else {
                continue;
            };
            if !range.contains(date) {
                continue;
            }
            dated.push((
                date,
                ClassRecord {
                    month: codec::month_key(date),
                    date: record.date,
                    time: record.time,
                    period: record.period,
                    subject: record.subject,
                    section: record.section,
                    note: record.note,
                },
            ));
        }
    }
    dated.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(dated.into_iter().map(|(_, r)| r).collect())
}

fn summarize(records: &[ClassRecord]) -> WorkloadSummary {
    let days: BTreeSet<&str> = records.iter().map(|r| r.date.as_str()).collect();
    let mut subject_distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut section_distribution: BTreeMap<String, usize> = BTreeMap::new();
    for r in records {
        *subject_distribution.entry(r.subject.clone()).or_default() += 1;
        *section_distribution.entry(r.section.clone()).or_default() += 1;
    }
    WorkloadSummary {
        total_classes: records.len(),
        days_engaged: days.len(),
        daily_average: round2(records.len() as f64 / days.len().max(1) as f64),
        unique_subjects: subject_distribution.len(),
        unique_sections: section_distribution.len(),
        subject_distribution,
        section_distribution,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
