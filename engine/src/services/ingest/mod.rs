//! Participant-row ingestion.
//!
//! Rows are validated field by field before any rendering is attempted; a
//! file with any invalid row is rejected as a whole, with per-row detail.
//! One deliberate exception: a missing or unusable `Category` is not an
//! error. It falls back to the fixed default, because ingestion is meant
//! to be lenient there.

use std::collections::HashMap;
use std::io::Read;

use log::debug;
use regex::Regex;

use crate::error::{EngineError, Result, RowError};
use crate::services::storage::DEFAULT_CATEGORY;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_CERT_ID_LEN: usize = 50;

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";
const CATEGORY_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9 _&-]*$";

/// A validated input row, ready to become a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRow {
    pub sr_no: Option<u32>,
    pub name: String,
    pub email: String,
    /// Pre-assigned certificate ID; generated later when absent.
    pub certificate_id: Option<String>,
    pub category: String,
}

/// Parses and validates participant rows from CSV bytes.
///
/// Returns every row on success, or `EngineError::Validation` carrying one
/// `RowError` per offending field. Row numbers are 1-based and count the
/// header line.
pub fn parse_rows<R: Read>(reader: R) -> Result<Vec<ParticipantRow>> {
    let email_re = Regex::new(EMAIL_PATTERN).expect("email pattern");
    let category_re = Regex::new(CATEGORY_PATTERN).expect("category pattern");

    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| {
            EngineError::Validation(vec![RowError {
                row: 1,
                field: "header".to_string(),
                message: format!("unreadable header: {e}"),
            }])
        })?
        .clone();
    let mut column_index: HashMap<String, usize> = HashMap::new();
    for (idx, title) in headers.iter().enumerate() {
        column_index.insert(title.trim().to_string(), idx);
    }

    let mut header_errors = Vec::new();
    for required in ["Name", "Email"] {
        if !column_index.contains_key(required) {
            header_errors.push(RowError {
                row: 1,
                field: required.to_string(),
                message: "missing required column".to_string(),
            });
        }
    }
    if !header_errors.is_empty() {
        return Err(EngineError::Validation(header_errors));
    }

    let field = |record: &csv::StringRecord, title: &str| -> Option<String> {
        column_index
            .get(title)
            .and_then(|&idx| record.get(idx))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    for (i, record) in csv_reader.records().enumerate() {
        let row_no = i + 2; // header is row 1
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                errors.push(RowError {
                    row: row_no,
                    field: "row".to_string(),
                    message: e.to_string(),
                });
                continue;
            }
        };

        let sr_no = match field(&record, "Sr_no") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) => Some(n),
                Err(_) => {
                    errors.push(RowError {
                        row: row_no,
                        field: "Sr_no".to_string(),
                        message: format!("'{raw}' is not a number"),
                    });
                    None
                }
            },
            None => None,
        };

        let name = match field(&record, "Name") {
            Some(name) if name.chars().count() <= MAX_NAME_LEN => Some(name),
            Some(_) => {
                errors.push(RowError {
                    row: row_no,
                    field: "Name".to_string(),
                    message: format!("longer than {MAX_NAME_LEN} characters"),
                });
                None
            }
            None => {
                errors.push(RowError {
                    row: row_no,
                    field: "Name".to_string(),
                    message: "required".to_string(),
                });
                None
            }
        };

        let email = match field(&record, "Email") {
            Some(email) if email_re.is_match(&email) => Some(email),
            Some(email) => {
                errors.push(RowError {
                    row: row_no,
                    field: "Email".to_string(),
                    message: format!("'{email}' is not an email address"),
                });
                None
            }
            None => {
                errors.push(RowError {
                    row: row_no,
                    field: "Email".to_string(),
                    message: "required".to_string(),
                });
                None
            }
        };

        let certificate_id = match field(&record, "Certificate_ID") {
            Some(id) if id.chars().count() <= MAX_CERT_ID_LEN => Some(id),
            Some(_) => {
                errors.push(RowError {
                    row: row_no,
                    field: "Certificate_ID".to_string(),
                    message: format!("longer than {MAX_CERT_ID_LEN} characters"),
                });
                None
            }
            None => None,
        };

        // Lenient by design: anything unusable becomes the default.
        let category = match field(&record, "Category") {
            Some(raw) if category_re.is_match(&raw) => raw,
            _ => DEFAULT_CATEGORY.to_string(),
        };

        if let (Some(name), Some(email)) = (name, email) {
            rows.push(ParticipantRow { sr_no, name, email, certificate_id, category });
        }
    }

    if errors.is_empty() {
        debug!("ingested {} participant rows", rows.len());
        Ok(rows)
    } else {
        Err(EngineError::Validation(errors))
    }
}
