use serde::{Deserialize, Serialize};

/// Append-only record of an issued certificate ID. The full set of entries
/// is the uniqueness ledger consulted by the ID generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateIdLogEntry {
    pub certificate_id: String,
    pub batch_id: String,
    pub prefix: String,
    /// Issue date, `YYYY-MM-DD`.
    pub issued_on: String,
}
