//! Certificate ID issuance: `PREFIX-YYYYMMDD-MMM-NNNNN`.
//!
//! Uniqueness is checked against an injected [`IdRegistry`] strategy (the
//! durable SQLite ledger in production, a process-local set when the ledger
//! is unavailable), never against hidden module state. Candidates are
//! retried on collision up to a fixed ceiling, and every issued ID is
//! recorded in the registry before it is handed back.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use chrono::{Datelike, NaiveDate};
use rand::Rng;
use regex::Regex;

use common::model::ledger::CertificateIdLogEntry;

use crate::error::{EngineError, Result};

/// Collision retry ceiling.
pub const MAX_ATTEMPTS: u32 = 10;

const ID_PATTERN: &str = r"^[A-Z]{2,10}-\d{8}-[A-Z]{3}-\d{5}$";
const PREFIX_PATTERN: &str = r"^[A-Z]{2,10}$";

const MONTH_TAGS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ID_PATTERN).expect("id pattern"))
}

fn prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PREFIX_PATTERN).expect("prefix pattern"))
}

/// Uniqueness-checking strategy for issued IDs.
///
/// `record` returns `false` when the ID was already present, which callers
/// treat as a collision; this is what makes concurrent batches sharing one
/// ledger safe without a generator-side lock.
pub trait IdRegistry {
    fn exists(&self, certificate_id: &str) -> Result<bool>;
    fn record(&self, entry: &CertificateIdLogEntry) -> Result<bool>;
}

/// Process-local fallback registry for when the durable ledger is
/// unavailable. Uniqueness only holds within this process.
#[derive(Default)]
pub struct InMemoryRegistry {
    ids: Mutex<HashSet<String>>,
}

impl InMemoryRegistry {
    pub fn new() -> InMemoryRegistry {
        InMemoryRegistry::default()
    }
}

impl IdRegistry for InMemoryRegistry {
    fn exists(&self, certificate_id: &str) -> Result<bool> {
        Ok(self.ids.lock().unwrap().contains(certificate_id))
    }

    fn record(&self, entry: &CertificateIdLogEntry) -> Result<bool> {
        Ok(self.ids.lock().unwrap().insert(entry.certificate_id.clone()))
    }
}

/// Issues certificate IDs unique against the supplied registry.
pub struct IdGenerator<'a, R: IdRegistry> {
    registry: &'a R,
    prefix: String,
}

impl<'a, R: IdRegistry> IdGenerator<'a, R> {
    /// The prefix must be 2–10 uppercase letters.
    pub fn new(registry: &'a R, prefix: &str) -> Result<IdGenerator<'a, R>> {
        if !prefix_regex().is_match(prefix) {
            return Err(EngineError::MalformedId(format!("invalid prefix '{prefix}'")));
        }
        Ok(IdGenerator { registry, prefix: prefix.to_string() })
    }

    /// Issues a fresh ID dated `issued_on`, logging it before returning.
    pub fn issue_on(&self, batch_id: &str, issued_on: NaiveDate) -> Result<String> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_ATTEMPTS {
            let suffix: u32 = rng.gen_range(0..100_000);
            let candidate = format_id(&self.prefix, issued_on, suffix);
            if self.registry.exists(&candidate)? {
                continue;
            }
            let entry = CertificateIdLogEntry {
                certificate_id: candidate.clone(),
                batch_id: batch_id.to_string(),
                prefix: self.prefix.clone(),
                issued_on: issued_on.format("%Y-%m-%d").to_string(),
            };
            // A lost race against another writer shows up here as a
            // duplicate; treat it like any other collision.
            if self.registry.record(&entry)? {
                return Ok(candidate);
            }
        }
        Err(EngineError::IdExhausted { attempts: MAX_ATTEMPTS })
    }

    /// Issues a fresh ID dated today.
    pub fn issue(&self, batch_id: &str) -> Result<String> {
        self.issue_on(batch_id, chrono::Local::now().date_naive())
    }
}

fn format_id(prefix: &str, date: NaiveDate, suffix: u32) -> String {
    let month_tag = MONTH_TAGS[date.month0() as usize];
    format!("{}-{}-{}-{:05}", prefix, date.format("%Y%m%d"), month_tag, suffix)
}

/// Checks an ID against the issued format.
pub fn validate(certificate_id: &str) -> bool {
    id_regex().is_match(certificate_id)
}

/// Components recovered from a well-formed certificate ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificateId {
    pub prefix: String,
    pub issued_on: NaiveDate,
    pub month_tag: String,
    pub suffix: u32,
}

/// Decomposes a well-formed ID. Malformed input is a usage error, not
/// silently tolerated.
pub fn parse(certificate_id: &str) -> Result<ParsedCertificateId> {
    let malformed = || EngineError::MalformedId(certificate_id.to_string());
    if !validate(certificate_id) {
        return Err(malformed());
    }
    let parts: Vec<&str> = certificate_id.split('-').collect();
    let issued_on =
        NaiveDate::parse_from_str(parts[1], "%Y%m%d").map_err(|_| malformed())?;
    let month_tag = parts[2].to_string();
    if MONTH_TAGS[issued_on.month0() as usize] != month_tag {
        return Err(malformed());
    }
    let suffix: u32 = parts[3].parse().map_err(|_| malformed())?;
    Ok(ParsedCertificateId {
        prefix: parts[0].to_string(),
        issued_on,
        month_tag,
        suffix,
    })
}
