use crate::codec::{Entry, EncodeError};

/// A period cell holds one token per line, in the order the marks were made.
/// Undecodable lines are dropped rather than failing the read; legacy
/// workbooks contain hand-edited cells.
pub fn read(text: &str) -> Vec<Entry> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| match Entry::decode(l) {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::debug!(line = l, %err, "skipping malformed entry");
                None
            }
        })
        .collect()
}

pub fn append(old: &str, entry: &Entry) -> Result<String, EncodeError> {
    let token = entry.encode()?;
    let old = old.trim_end_matches('\n');
    if old.trim().is_empty() {
        Ok(token)
    } else {
        Ok(format!("{}\n{}", old, token))
    }
}

/// Alternate single-mark-per-period policy: prior history is discarded.
/// `mark` uses append; mixing the two in one workspace breaks the
/// one-entry-per-subject-per-date counting assumption.
pub fn overwrite(_old: &str, entry: &Entry) -> Result<String, EncodeError> {
    entry.encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Status;

    fn entry(date: &str, status: Status) -> Entry {
        Entry {
            date: date.to_string(),
            time: "9:00AM".to_string(),
            status,
            recorder: "Dr.X".to_string(),
            subject: "Math".to_string(),
            note: None,
        }
    }

    #[test]
    fn append_onto_empty_is_single_token() {
        let e = entry("01/01/2024", Status::Present);
        let cell = append("", &e).unwrap();
        assert_eq!(cell, "01/01/2024_9:00AM_P_Dr.X_Math");
        assert_eq!(read(&cell), vec![e]);
    }

    #[test]
    fn append_preserves_order() {
        let a = entry("01/01/2024", Status::Present);
        let b = entry("02/01/2024", Status::Absent);
        let cell = append(&append("", &a).unwrap(), &b).unwrap();
        assert_eq!(read(&cell), vec![a, b]);
    }

    #[test]
    fn overwrite_discards_history() {
        let a = entry("01/01/2024", Status::Present);
        let b = entry("02/01/2024", Status::Absent);
        let cell = append("", &a).unwrap();
        let cell = overwrite(&cell, &b).unwrap();
        assert_eq!(read(&cell), vec![b]);
    }

    #[test]
    fn read_skips_malformed_lines() {
        let good = entry("01/01/2024", Status::Present);
        let cell = format!("{}\nnot_a_valid_token\n", good.encode().unwrap());
        assert_eq!(read(&cell), vec![good]);
    }

    #[test]
    fn read_of_blank_cell_is_empty() {
        assert!(read("").is_empty());
        assert!(read("  \n \n").is_empty());
    }
}
