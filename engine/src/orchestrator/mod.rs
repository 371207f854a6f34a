//! Batch generation orchestration.
//!
//! `run_generation_blocking` contains the complete synchronous pipeline,
//! meant to run inside `spawn_blocking`: load the batch and template, then
//! for each participant render, write locally, upload, and persist paths,
//! strictly in sequence. A render failure is isolated to that participant;
//! a storage failure still counts the participant as succeeded with a null
//! storage URL. Batch status always leaves `processing` at the end of a
//! run, whatever happens.
//!
//! `schedule_generation` wraps the blocking pipeline in the async job
//! machinery: it registers a pending job, forwards per-participant progress
//! snapshots to the central job updater, and reports the final result or
//! failure when the worker thread finishes.

use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use common::jobs::{BatchResult, GenerationError, GenerationErrorKind, JobStatus, ProgressSnapshot};
use common::model::batch::{Batch, BatchStatus};
use common::model::participant::Participant;

use crate::db::Database;
use crate::error::Result;
use crate::job_controller::state::{JobUpdate, JobsState};
use crate::services::certificate_id::IdGenerator;
use crate::services::fonts::FontCatalog;
use crate::services::ingest::ParticipantRow;
use crate::services::render::TemplateRenderer;
use crate::services::storage::{FsObjectStore, StorageOrganizer, DEFAULT_CATEGORY};

const PROGRESS_CHANNEL_CAPACITY: usize = 100;

/// Everything the blocking pipeline needs to find its resources.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    /// Root of the durable object store.
    pub storage_root: PathBuf,
    /// Directory local certificate copies are written under.
    pub output_dir: PathBuf,
    /// Base URL stored objects are addressed by.
    pub base_url: String,
    /// Secret used to sign presigned retrieval URLs.
    pub url_secret: String,
}

/// Which participants a run touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Every participant in the batch.
    All,
    /// Only participants missing a local copy or a storage URL.
    FailedOnly,
}

/// Creates a batch and its participants from validated rows.
///
/// Rows without a pre-assigned certificate ID get one issued against the
/// database ledger under `id_prefix`. A row whose ID cannot be assigned
/// (exhausted retries, or a duplicate pre-assigned ID) is skipped and
/// reported, never aborting the rest of the batch.
pub fn create_batch(
    db: &Database,
    name: &str,
    categories: Vec<String>,
    template_id: &str,
    rows: Vec<ParticipantRow>,
    id_prefix: &str,
) -> Result<(Batch, Vec<GenerationError>)> {
    // The template must exist before anything is persisted.
    db.get_template(template_id)?;

    let batch = Batch {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        categories,
        template_id: template_id.to_string(),
        status: BatchStatus::Pending,
        generated_count: 0,
    };
    db.insert_batch(&batch)?;

    let generator = IdGenerator::new(db, id_prefix)?;
    let mut errors = Vec::new();
    for (i, row) in rows.into_iter().enumerate() {
        let certificate_id = match row.certificate_id {
            Some(id) => id,
            None => match generator.issue(&batch.id) {
                Ok(id) => id,
                Err(e) => {
                    warn!("no certificate ID for '{}': {e}", row.name);
                    errors.push(GenerationError {
                        participant: row.name,
                        certificate_id: None,
                        kind: GenerationErrorKind::IdAssignment,
                        message: e.to_string(),
                    });
                    continue;
                }
            },
        };
        let participant = Participant {
            id: Uuid::new_v4().to_string(),
            name: row.name,
            email: row.email,
            certificate_id: certificate_id.clone(),
            sr_no: row.sr_no.unwrap_or(i as u32 + 1),
            batch_id: batch.id.clone(),
            local_path: None,
            storage_url: None,
        };
        // The UNIQUE constraint on certificate IDs surfaces duplicates here.
        if let Err(e) = db.insert_participant(&participant) {
            errors.push(GenerationError {
                participant: participant.name,
                certificate_id: Some(certificate_id),
                kind: GenerationErrorKind::IdAssignment,
                message: e.to_string(),
            });
        }
    }
    info!("created batch {} ({} skipped rows)", batch.id, errors.len());
    Ok((batch, errors))
}

/// Runs a batch to completion on the current thread.
///
/// Fatal setup errors (missing batch, missing template, unreadable
/// database) leave the batch marked `failed` and are returned as `Err`.
/// Everything past setup is collected per participant and reported on the
/// `BatchResult` instead.
pub fn run_generation_blocking(
    config: &EngineConfig,
    batch_id: &str,
    mode: RunMode,
    progress: &mpsc::Sender<ProgressSnapshot>,
) -> Result<BatchResult> {
    let db = Database::open(&config.db_path)?;
    match generate(&db, config, batch_id, mode, progress) {
        Ok(result) => Ok(result),
        Err(err) => {
            // The batch must never be left stuck in `processing`.
            let _ = db.update_batch_status(batch_id, BatchStatus::Failed);
            Err(err)
        }
    }
}

fn generate(
    db: &Database,
    config: &EngineConfig,
    batch_id: &str,
    mode: RunMode,
    progress: &mpsc::Sender<ProgressSnapshot>,
) -> Result<BatchResult> {
    let batch = db.get_batch(batch_id)?;
    let template = db.get_template(&batch.template_id)?;
    let surface = db.template_surface(&template.id)?;

    db.update_batch_status(batch_id, BatchStatus::Processing)?;

    let participants = db.participants_by_batch(batch_id)?;
    let worklist: Vec<Participant> = match mode {
        RunMode::All => participants,
        RunMode::FailedOnly => participants
            .into_iter()
            .filter(|p| p.local_path.is_none() || p.storage_url.is_none())
            .collect(),
    };

    let fonts = FontCatalog::bundled()?;
    let renderer = TemplateRenderer::new(&fonts);
    let organizer = StorageOrganizer::new(
        FsObjectStore::new(&config.storage_root),
        &config.base_url,
        &config.url_secret,
    );
    let generated_on = chrono::Local::now().date_naive();
    let category = batch
        .categories
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    let out_dir = config.output_dir.join(format!("batch_{batch_id}"));
    fs::create_dir_all(&out_dir)?;

    let total = worklist.len();
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut errors: Vec<GenerationError> = Vec::new();

    info!("batch {batch_id}: generating {total} certificates ({mode:?})");
    for (processed, participant) in worklist.iter().enumerate() {
        let mut local_path = participant.local_path.clone();
        let mut storage_url = participant.storage_url.clone();
        let mut rendered: Option<Vec<u8>> = None;

        let needs_render = mode == RunMode::All || local_path.is_none();
        if needs_render {
            match renderer
                .render(
                    &surface,
                    template.surface_kind,
                    &participant.name,
                    &participant.certificate_id,
                    &template.placement,
                )
                .and_then(|result| {
                    let path = out_dir.join(format!("{}.pdf", participant.certificate_id));
                    fs::write(&path, &result.bytes)?;
                    Ok((result.bytes, path))
                }) {
                Ok((bytes, path)) => {
                    rendered = Some(bytes);
                    local_path = Some(path.to_string_lossy().into_owned());
                }
                Err(e) => {
                    warn!("render failed for '{}': {e}", participant.name);
                    failed += 1;
                    errors.push(GenerationError {
                        participant: participant.name.clone(),
                        certificate_id: Some(participant.certificate_id.clone()),
                        kind: GenerationErrorKind::Render,
                        message: e.to_string(),
                    });
                    send_progress(progress, processed + 1, total, succeeded, failed, participant);
                    continue;
                }
            }
        }

        if storage_url.is_none() {
            let upload = rendered
                .as_deref()
                .map(|bytes| Ok(bytes.to_vec()))
                .unwrap_or_else(|| {
                    // Retrying an earlier storage failure: reuse the copy on disk.
                    fs::read(local_path.as_deref().unwrap_or_default()).map_err(Into::into)
                })
                .and_then(|bytes| {
                    organizer.upload_certificate(
                        &bytes,
                        generated_on,
                        &category,
                        batch_id,
                        &participant.certificate_id,
                        &participant.name,
                        &participant.email,
                    )
                });
            match upload {
                Ok(key) => storage_url = Some(organizer.object_url(&key)),
                Err(e) => {
                    // Not fatal to the participant; the URL just stays null.
                    warn!("upload failed for '{}': {e}", participant.name);
                    errors.push(GenerationError {
                        participant: participant.name.clone(),
                        certificate_id: Some(participant.certificate_id.clone()),
                        kind: GenerationErrorKind::Storage,
                        message: e.to_string(),
                    });
                }
            }
        }

        succeeded += 1;
        db.update_participant_paths(
            &participant.id,
            local_path.as_deref(),
            storage_url.as_deref(),
        )?;
        if rendered.is_some() {
            db.increment_generated(batch_id)?;
        }
        send_progress(progress, processed + 1, total, succeeded, failed, participant);
    }

    let status = if total == 0 || succeeded > 0 {
        BatchStatus::Completed
    } else {
        BatchStatus::Failed
    };
    db.update_batch_status(batch_id, status)?;
    info!("batch {batch_id}: {succeeded} succeeded, {failed} failed, status {}", status.as_str());

    Ok(BatchResult {
        batch_id: batch_id.to_string(),
        total,
        succeeded,
        failed,
        errors,
    })
}

fn send_progress(
    progress: &mpsc::Sender<ProgressSnapshot>,
    processed: usize,
    total: usize,
    succeeded: usize,
    failed: usize,
    participant: &Participant,
) {
    // A closed receiver only means nobody is watching.
    let _ = progress.blocking_send(ProgressSnapshot {
        processed,
        total,
        succeeded,
        failed,
        current: Some(participant.name.clone()),
    });
}

/// Schedules a full generation run for `batch_id` and returns its job ID.
pub async fn schedule_generation(state: &JobsState, config: EngineConfig, batch_id: String) -> String {
    schedule(state, config, batch_id, RunMode::All).await
}

/// Schedules a retry run touching only participants that are missing a
/// local copy or storage URL.
pub async fn schedule_regeneration(state: &JobsState, config: EngineConfig, batch_id: String) -> String {
    schedule(state, config, batch_id, RunMode::FailedOnly).await
}

async fn schedule(state: &JobsState, config: EngineConfig, batch_id: String, mode: RunMode) -> String {
    let job_id = Uuid::new_v4().to_string();
    state
        .jobs
        .write()
        .await
        .insert(job_id.clone(), JobStatus::Pending);

    let tx = state.tx.clone();
    let job_id_clone = job_id.clone();

    tokio::spawn(async move {
        // A dedicated channel for this job's per-participant snapshots.
        let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressSnapshot>(PROGRESS_CHANNEL_CAPACITY);

        // Forward snapshots from the worker thread to the central updater.
        let updater_tx = tx.clone();
        let job_id_for_updater = job_id_clone.clone();
        tokio::spawn(async move {
            while let Some(snapshot) = progress_rx.recv().await {
                let _ = updater_tx
                    .send(JobUpdate {
                        job_id: job_id_for_updater.clone(),
                        status: JobStatus::InProgress(snapshot),
                    })
                    .await;
            }
        });

        let batch_for_blocking = batch_id.clone();
        let handle = tokio::task::spawn_blocking(move || {
            run_generation_blocking(&config, &batch_for_blocking, mode, &progress_tx)
        });

        let status = match handle.await {
            Ok(Ok(result)) => JobStatus::Completed(result),
            Ok(Err(e)) => JobStatus::Failed(e.to_string()),
            Err(e) => JobStatus::Failed(format!("task join error: {e}")),
        };
        let _ = tx.send(JobUpdate { job_id: job_id_clone, status }).await;
    });

    job_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::placement::{PlacementSpec, RgbColor, TextElementSpec};
    use common::model::template::{SurfaceKind, Template};
    use crate::services::certificate_id;

    fn seed_template(db: &Database) {
        db.insert_template(
            &Template {
                id: "t1".into(),
                display_name: "Completion".into(),
                categories: vec!["tech".into()],
                surface_kind: SurfaceKind::Pdf,
                surface_key: None,
                placement: PlacementSpec {
                    name: TextElementSpec {
                        x: None,
                        y: 300.0,
                        font_size: 36.0,
                        font_family: "Helvetica".into(),
                        color: RgbColor { r: 0, g: 0, b: 0 },
                        bold: false,
                        italic: false,
                    },
                    certificate_id: TextElementSpec {
                        x: Some(40.0),
                        y: 40.0,
                        font_size: 10.0,
                        font_family: "Courier".into(),
                        color: RgbColor { r: 80, g: 80, b: 80 },
                        bold: false,
                        italic: false,
                    },
                    canvas_width: 800.0,
                    canvas_height: 600.0,
                },
            },
            b"%PDF-fake",
        )
        .unwrap();
    }

    fn row(name: &str, certificate_id: Option<&str>) -> ParticipantRow {
        ParticipantRow {
            sr_no: None,
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            certificate_id: certificate_id.map(String::from),
            category: DEFAULT_CATEGORY.into(),
        }
    }

    #[test]
    fn create_batch_assigns_ids_where_missing() {
        let db = Database::open_in_memory().unwrap();
        seed_template(&db);
        let rows = vec![row("Ana", None), row("Ben", Some("LEGACY-001"))];
        let (batch, errors) = create_batch(&db, "August", vec!["tech".into()], "t1", rows, "CERT").unwrap();
        assert!(errors.is_empty());

        let participants = db.participants_by_batch(&batch.id).unwrap();
        assert_eq!(participants.len(), 2);
        assert!(certificate_id::validate(&participants[0].certificate_id));
        assert_eq!(participants[1].certificate_id, "LEGACY-001");
        assert_eq!(participants[0].sr_no, 1);
        assert_eq!(participants[1].sr_no, 2);
    }

    #[test]
    fn duplicate_preassigned_id_skips_only_that_row() {
        let db = Database::open_in_memory().unwrap();
        seed_template(&db);
        let rows = vec![
            row("Ana", Some("DUP-001")),
            row("Ben", Some("DUP-001")),
            row("Cleo", None),
        ];
        let (batch, errors) = create_batch(&db, "August", vec![], "t1", rows, "CERT").unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].participant, "Ben");
        assert_eq!(errors[0].kind, GenerationErrorKind::IdAssignment);
        assert_eq!(db.participants_by_batch(&batch.id).unwrap().len(), 2);
    }

    #[test]
    fn create_batch_requires_an_existing_template() {
        let db = Database::open_in_memory().unwrap();
        assert!(create_batch(&db, "August", vec![], "missing", vec![], "CERT").is_err());
    }
}
