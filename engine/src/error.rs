use thiserror::Error;

/// Errors surfaced by the generation engine.
///
/// Per-participant render and storage failures are collected into the batch
/// result rather than returned through this type; `EngineError` carries the
/// fatal conditions (and the reusable row-validation detail).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input rows rejected before any rendering was attempted.
    #[error("input validation failed with {} row error(s)", .0.len())]
    Validation(Vec<RowError>),

    /// Template bytes could not be read or drawn over.
    #[error("render failed: {0}")]
    Render(String),

    /// A durable-storage operation failed.
    #[error("storage failed: {0}")]
    Storage(String),

    /// The certificate-ID collision retry ceiling was reached.
    #[error("certificate ID space exhausted after {attempts} attempts")]
    IdExhausted { attempts: u32 },

    /// A certificate ID that does not match the issued format was parsed.
    #[error("malformed certificate ID '{0}'")]
    MalformedId(String),

    /// Repository or template lookup failure before any participant was
    /// processed; aborts the whole run.
    #[error("batch fatal: {0}")]
    BatchFatal(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Field-level detail for one rejected input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// 1-based row number in the uploaded file, counting the header as row 1.
    pub row: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}, column '{}': {}", self.row, self.field, self.message)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
