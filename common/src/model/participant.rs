use serde::{Deserialize, Serialize};

/// One certificate recipient inside a batch.
///
/// `local_path` and `storage_url` start out null and are filled in by the
/// orchestrator as the participant's render and upload steps succeed. The
/// two are independently observable: a successful render with a failed
/// upload leaves `storage_url` null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub email: String,
    pub certificate_id: String,
    pub sr_no: u32,
    pub batch_id: String,
    pub local_path: Option<String>,
    pub storage_url: Option<String>,
}
