use serde::{Deserialize, Serialize};

/// Point-in-time view of a running generation job, published after every
/// participant is processed (success or failure).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Name of the participant that was just processed.
    pub current: Option<String>,
}

/// Classifies a per-participant failure collected during a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationErrorKind {
    /// The render step failed; the participant has no certificate.
    Render,
    /// The render succeeded but the upload did not; `storage_url` stays null.
    Storage,
    /// No certificate ID could be assigned to the participant.
    IdAssignment,
}

/// One collected per-participant error. These are reported on the batch
/// result, never thrown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationError {
    pub participant: String,
    pub certificate_id: Option<String>,
    pub kind: GenerationErrorKind,
    pub message: String,
}

/// Final report of a batch generation run. Always carries the full
/// counters and error detail, including when `succeeded` is zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<GenerationError>,
}

/// Status of a background generation job as tracked by the job controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    InProgress(ProgressSnapshot),
    Completed(BatchResult),
    Failed(String),
}
