//! Input adapters: subject table and proxy list.

use crate::error::{Error, Result};
use crate::proxy::normalize_proxy_address;
use crate::types::{Subject, SubjectId};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// Date format used by the subject table
const INPUT_DATE_FORMAT: &str = "%Y-%m-%d";

/// One raw row of the subject table
#[derive(Debug, Deserialize)]
struct SubjectRow {
    id: String,
    family_name: String,
    name: String,
    #[serde(default)]
    patronymic: String,
    birth_date: String,
    #[serde(default)]
    death_date: Option<String>,
}

impl SubjectRow {
    fn into_subject(self, row: usize) -> Result<Subject> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(Error::InvalidSubject {
                row,
                reason: "empty id".to_string(),
            });
        }
        if self.family_name.trim().is_empty() {
            return Err(Error::InvalidSubject {
                row,
                reason: "empty family_name".to_string(),
            });
        }

        let birth_date = NaiveDate::parse_from_str(self.birth_date.trim(), INPUT_DATE_FORMAT)
            .map_err(|e| Error::InvalidSubject {
                row,
                reason: format!("birth_date {:?}: {e}", self.birth_date),
            })?;

        let death_date = match self.death_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) if raw.eq_ignore_ascii_case("null") => None,
            Some(raw) => match NaiveDate::parse_from_str(raw, INPUT_DATE_FORMAT) {
                Ok(date) => Some(date),
                Err(e) => {
                    tracing::warn!(row, subject_id = %id, value = %raw, error = %e, "ignoring malformed death_date");
                    None
                }
            },
        };

        Ok(Subject {
            id: SubjectId::new(id),
            family_name: self.family_name.trim().to_string(),
            name: self.name.trim().to_string(),
            patronymic: self.patronymic.trim().to_string(),
            birth_date,
            death_date,
        })
    }
}

/// Read subjects from a CSV file with an
/// `id,family_name,name,patronymic,birth_date,death_date` header
///
/// Rows that fail validation are skipped with a warning.
pub fn load_subjects(path: impl AsRef<Path>) -> Result<Vec<Subject>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| Error::Input {
        path: path.to_path_buf(),
        source,
    })?;
    let subjects = subjects_from_reader(file)?;
    tracing::info!(path = %path.display(), subjects = subjects.len(), "subjects loaded");
    Ok(subjects)
}

/// Parse subjects from any CSV source; see [`load_subjects`]
pub fn subjects_from_reader<R: Read>(reader: R) -> Result<Vec<Subject>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(reader);

    let mut subjects = Vec::new();
    let mut skipped = 0usize;
    for (index, row) in csv_reader.deserialize::<SubjectRow>().enumerate() {
        let row_number = index + 1;
        let parsed = row
            .map_err(|e| Error::InvalidSubject {
                row: row_number,
                reason: e.to_string(),
            })
            .and_then(|row| row.into_subject(row_number));

        match parsed {
            Ok(subject) => subjects.push(subject),
            Err(e) => {
                skipped += 1;
                tracing::warn!(error = %e, "skipping subject row");
            }
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, kept = subjects.len(), "some subject rows were invalid");
    }
    Ok(subjects)
}

/// Read proxy addresses, one per line
///
/// Blank lines and `#` comments are ignored, addresses without a scheme get
/// `http://`, duplicates keep their first position.
pub fn load_proxies(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Input {
        path: path.to_path_buf(),
        source,
    })?;
    let proxies = parse_proxy_list(&raw);
    tracing::info!(path = %path.display(), proxies = proxies.len(), "proxy list loaded");
    Ok(proxies)
}

/// Parse a newline-separated proxy list; see [`load_proxies`]
pub fn parse_proxy_list(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let normalized = normalize_proxy_address(line);
            if normalized.is_none() {
                tracing::warn!(line, "ignoring unparsable proxy address");
            }
            normalized
        })
        .filter(|address| seen.insert(address.clone()))
        .collect()
}
