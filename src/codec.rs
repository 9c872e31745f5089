use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

/// Field delimiter inside a stored token. Legacy workbooks used the same
/// underscore-joined layout, so the encoding is kept byte-compatible.
pub const DELIM: char = '_';

pub const DATE_FMT: &str = "%d/%m/%Y";

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("token has {0} fields, expected at least {1}")]
    TooFewFields(usize, usize),
    #[error("invalid status {0:?}, expected P or A")]
    BadStatus(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    #[error("field {0:?} contains the delimiter or a newline")]
    DelimiterCollision(String),
    #[error("lesson note contains a newline")]
    NoteNewline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Present,
    Absent,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Present => "P",
            Status::Absent => "A",
        }
    }

    pub fn parse(s: &str) -> Result<Status, DecodeError> {
        match s {
            "P" => Ok(Status::Present),
            "A" => Ok(Status::Absent),
            other => Err(DecodeError::BadStatus(other.to_string())),
        }
    }
}

/// One attendance event, as stored in a period cell. Date and time stay as
/// text; consumers that need structured values go through [`parse_date`] and
/// [`parse_time`] instead of re-parsing ad hoc.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub date: String,
    pub time: String,
    pub status: Status,
    pub recorder: String,
    pub subject: String,
    pub note: Option<String>,
}

impl Entry {
    /// `DD/MM/YYYY_H:MMAM_P_<recorder>_<subject>[_<note>]`
    pub fn encode(&self) -> Result<String, EncodeError> {
        let fields = [
            self.date.as_str(),
            self.time.as_str(),
            self.status.as_str(),
            self.recorder.as_str(),
            self.subject.as_str(),
        ];
        join_token(&fields, self.note.as_deref())
    }

    pub fn decode(token: &str) -> Result<Entry, DecodeError> {
        let parts: Vec<&str> = token.split(DELIM).collect();
        if parts.len() < 5 {
            return Err(DecodeError::TooFewFields(parts.len(), 5));
        }
        Ok(Entry {
            date: parts[0].to_string(),
            time: parts[1].to_string(),
            status: Status::parse(parts[2])?,
            recorder: parts[3].to_string(),
            subject: parts[4].to_string(),
            note: rejoin_note(&parts[5..]),
        })
    }
}

/// One class taught, as stored in a faculty month column. Keyed by what was
/// taught rather than by student.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadRecord {
    pub date: String,
    pub time: String,
    pub period: String,
    pub subject: String,
    pub section: String,
    pub note: Option<String>,
}

impl WorkloadRecord {
    /// `DD/MM/YYYY_H:MMAM_<period>_<subject>_<section>[_<note>]`
    pub fn encode(&self) -> Result<String, EncodeError> {
        let fields = [
            self.date.as_str(),
            self.time.as_str(),
            self.period.as_str(),
            self.subject.as_str(),
            self.section.as_str(),
        ];
        join_token(&fields, self.note.as_deref())
    }

    pub fn decode(token: &str) -> Result<WorkloadRecord, DecodeError> {
        let parts: Vec<&str> = token.split(DELIM).collect();
        if parts.len() < 5 {
            return Err(DecodeError::TooFewFields(parts.len(), 5));
        }
        Ok(WorkloadRecord {
            date: parts[0].to_string(),
            time: parts[1].to_string(),
            period: parts[2].to_string(),
            subject: parts[3].to_string(),
            section: parts[4].to_string(),
            note: rejoin_note(&parts[5..]),
        })
    }
}

fn join_token(fields: &[&str], note: Option<&str>) -> Result<String, EncodeError> {
    for f in fields {
        if f.contains(DELIM) || f.contains('\n') {
            return Err(EncodeError::DelimiterCollision(f.to_string()));
        }
    }
    let mut out = fields.join("_");
    if let Some(note) = note {
        // The note is free text and may contain the delimiter; decode re-joins
        // trailing fields. Newlines would split the token across cell lines.
        if note.contains('\n') {
            return Err(EncodeError::NoteNewline);
        }
        out.push(DELIM);
        out.push_str(note);
    }
    Ok(out)
}

fn rejoin_note(rest: &[&str]) -> Option<String> {
    if rest.is_empty() {
        None
    } else {
        Some(rest.join("_"))
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FMT).ok()
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

/// 12-hour clock with AM/PM suffix and no leading zero on the hour ("9:05AM").
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%I:%M%p").ok()
}

pub fn format_time(t: NaiveTime) -> String {
    let s = t.format("%I:%M%p").to_string();
    s.strip_prefix('0').map(|r| r.to_string()).unwrap_or(s)
}

/// Month-column label in the faculty table, e.g. "Dec2024".
pub fn month_key(d: NaiveDate) -> String {
    d.format("%b%Y").to_string()
}

/// Month keys are interpolated into SQL identifiers, so the shape is checked
/// strictly before any column is created or read.
pub fn is_month_key(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 7
        && b[0].is_ascii_uppercase()
        && b[1].is_ascii_lowercase()
        && b[2].is_ascii_lowercase()
        && b[3..].iter().all(|c| c.is_ascii_digit())
}
