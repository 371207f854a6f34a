//! End-to-end batch generation against a temporary database, object store
//! and output directory.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use tempfile::TempDir;
use tokio::sync::mpsc;

use common::jobs::GenerationErrorKind;
use common::model::batch::BatchStatus;
use common::model::placement::{PlacementSpec, RgbColor, TextElementSpec};
use common::model::template::{ImageKind, SurfaceKind, Template};

use engine::db::Database;
use engine::orchestrator::{create_batch, run_generation_blocking, EngineConfig, RunMode};
use engine::services::certificate_id;
use engine::services::ingest::ParticipantRow;

fn placement() -> PlacementSpec {
    PlacementSpec {
        name: TextElementSpec {
            x: None,
            y: 300.0,
            font_size: 36.0,
            font_family: "Helvetica".into(),
            color: RgbColor { r: 20, g: 20, b: 20 },
            bold: true,
            italic: false,
        },
        certificate_id: TextElementSpec {
            x: Some(40.0),
            y: 40.0,
            font_size: 10.0,
            font_family: "Courier".into(),
            color: RgbColor { r: 90, g: 90, b: 90 },
            bold: false,
            italic: false,
        },
        canvas_width: 800.0,
        canvas_height: 600.0,
    }
}

fn png_surface() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(800, 600, image::Rgb([250, 245, 230]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn seed_template(db: &Database, surface: &[u8]) {
    db.insert_template(
        &Template {
            id: "t1".into(),
            display_name: "Completion".into(),
            categories: vec!["tech".into()],
            surface_kind: SurfaceKind::Image(ImageKind::Png),
            surface_key: None,
            placement: placement(),
        },
        surface,
    )
    .unwrap();
}

fn rows(names: &[&str]) -> Vec<ParticipantRow> {
    names
        .iter()
        .map(|name| ParticipantRow {
            sr_no: None,
            name: (*name).to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            certificate_id: None,
            category: "tech".into(),
        })
        .collect()
}

fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        db_path: dir.path().join("certigen.sqlite"),
        storage_root: dir.path().join("storage"),
        output_dir: dir.path().join("out"),
        base_url: "file:///certigen".into(),
        url_secret: "test-secret".into(),
    }
}

fn run(config: &EngineConfig, batch_id: &str, mode: RunMode) -> engine::Result<common::jobs::BatchResult> {
    let (tx, _rx) = mpsc::channel(64);
    run_generation_blocking(config, batch_id, mode, &tx)
}

#[test]
fn generates_a_full_batch() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    let db = Database::open(&config.db_path).unwrap();
    seed_template(&db, &png_surface());
    let (batch, skipped) = create_batch(
        &db,
        "August cohort",
        vec!["tech".into()],
        "t1",
        rows(&["Ana Torres", "Ben Okafor", "Cleo Marsh"]),
        "CERT",
    )
    .unwrap();
    assert!(skipped.is_empty());
    drop(db);

    let (tx, mut rx) = mpsc::channel(64);
    let result = run_generation_blocking(&config, &batch.id, RunMode::All, &tx).unwrap();
    assert_eq!(result.total, 3);
    assert_eq!(result.succeeded, 3);
    assert_eq!(result.failed, 0);
    assert!(result.errors.is_empty());

    // One progress snapshot per participant, counters monotonically filled.
    let mut snapshots = Vec::new();
    while let Ok(snapshot) = rx.try_recv() {
        snapshots.push(snapshot);
    }
    assert_eq!(snapshots.len(), 3);
    assert_eq!(snapshots.last().unwrap().processed, 3);
    assert_eq!(snapshots.last().unwrap().succeeded, 3);

    let db = Database::open(&config.db_path).unwrap();
    assert_eq!(db.get_batch(&batch.id).unwrap().status, BatchStatus::Completed);
    assert_eq!(db.get_batch(&batch.id).unwrap().generated_count, 3);
    for participant in db.participants_by_batch(&batch.id).unwrap() {
        assert!(certificate_id::validate(&participant.certificate_id));
        let local = participant.local_path.expect("local copy");
        assert!(Path::new(&local).exists());
        assert!(fs::read(&local).unwrap().starts_with(b"%PDF"));
        let url = participant.storage_url.expect("storage url");
        assert!(url.starts_with("file:///certigen/certificates/"));
    }
}

#[test]
fn unreadable_surface_fails_every_participant_and_the_batch() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    let db = Database::open(&config.db_path).unwrap();
    seed_template(&db, b"not an image at all");
    let (batch, _) = create_batch(&db, "Broken", vec![], "t1", rows(&["Ana", "Ben"]), "CERT").unwrap();
    drop(db);

    let result = run(&config, &batch.id, RunMode::All).unwrap();
    assert_eq!(result.succeeded, 0);
    assert_eq!(result.failed, 2);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().all(|e| e.kind == GenerationErrorKind::Render));

    let db = Database::open(&config.db_path).unwrap();
    assert_eq!(db.get_batch(&batch.id).unwrap().status, BatchStatus::Failed);
    for participant in db.participants_by_batch(&batch.id).unwrap() {
        assert!(participant.local_path.is_none());
        assert!(participant.storage_url.is_none());
    }
}

#[test]
fn one_failing_participant_does_not_stop_the_rest() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    let db = Database::open(&config.db_path).unwrap();
    seed_template(&db, &png_surface());
    let mut batch_rows = rows(&["Ana Torres", "Ben Okafor"]);
    batch_rows[0].certificate_id = Some("BLOCKED-001".into());
    let (batch, skipped) =
        create_batch(&db, "August", vec!["tech".into()], "t1", batch_rows, "CERT").unwrap();
    assert!(skipped.is_empty());
    drop(db);

    // A directory squatting on the first participant's output path makes
    // that certificate unwritable; the second must still go through.
    fs::create_dir_all(
        config
            .output_dir
            .join(format!("batch_{}", batch.id))
            .join("BLOCKED-001.pdf"),
    )
    .unwrap();

    let result = run(&config, &batch.id, RunMode::All).unwrap();
    assert_eq!(result.total, 2);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].participant, "Ana Torres");
    assert_eq!(result.errors[0].kind, GenerationErrorKind::Render);

    let db = Database::open(&config.db_path).unwrap();
    assert_eq!(db.get_batch(&batch.id).unwrap().status, BatchStatus::Completed);
    assert_eq!(db.get_batch(&batch.id).unwrap().generated_count, 1);
    let participants = db.participants_by_batch(&batch.id).unwrap();
    assert!(participants[0].local_path.is_none());
    assert!(participants[0].storage_url.is_none());
    assert!(participants[1].local_path.is_some());
    assert!(participants[1].storage_url.is_some());
}

#[test]
fn storage_failure_is_not_fatal_to_the_participant() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    // A plain file where the store root should be makes every upload fail.
    fs::write(dir.path().join("blocked"), b"").unwrap();
    config.storage_root = dir.path().join("blocked");

    let db = Database::open(&config.db_path).unwrap();
    seed_template(&db, &png_surface());
    let (batch, _) = create_batch(&db, "August", vec![], "t1", rows(&["Ana"]), "CERT").unwrap();
    drop(db);

    let result = run(&config, &batch.id, RunMode::All).unwrap();
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, GenerationErrorKind::Storage);

    let db = Database::open(&config.db_path).unwrap();
    assert_eq!(db.get_batch(&batch.id).unwrap().status, BatchStatus::Completed);
    let participant = &db.participants_by_batch(&batch.id).unwrap()[0];
    assert!(participant.local_path.is_some());
    assert!(participant.storage_url.is_none());
}

#[test]
fn regeneration_skips_already_generated_participants() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    let db = Database::open(&config.db_path).unwrap();
    seed_template(&db, &png_surface());
    let (batch, _) = create_batch(&db, "August", vec![], "t1", rows(&["Ana", "Ben"]), "CERT").unwrap();
    drop(db);

    assert_eq!(run(&config, &batch.id, RunMode::All).unwrap().succeeded, 2);

    let db = Database::open(&config.db_path).unwrap();
    let urls_before: Vec<_> = db
        .participants_by_batch(&batch.id)
        .unwrap()
        .into_iter()
        .map(|p| p.storage_url)
        .collect();
    drop(db);

    let retry = run(&config, &batch.id, RunMode::FailedOnly).unwrap();
    assert_eq!(retry.total, 0);
    assert_eq!(retry.succeeded, 0);

    let db = Database::open(&config.db_path).unwrap();
    assert_eq!(db.get_batch(&batch.id).unwrap().status, BatchStatus::Completed);
    // Nothing re-rendered, nothing re-uploaded.
    assert_eq!(db.get_batch(&batch.id).unwrap().generated_count, 2);
    let urls_after: Vec<_> = db
        .participants_by_batch(&batch.id)
        .unwrap()
        .into_iter()
        .map(|p| p.storage_url)
        .collect();
    assert_eq!(urls_before, urls_after);
}

#[test]
fn regeneration_retries_failed_uploads_once_storage_recovers() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    fs::write(dir.path().join("blocked"), b"").unwrap();
    config.storage_root = dir.path().join("blocked");

    let db = Database::open(&config.db_path).unwrap();
    seed_template(&db, &png_surface());
    let (batch, _) = create_batch(&db, "August", vec![], "t1", rows(&["Ana"]), "CERT").unwrap();
    drop(db);

    let first = run(&config, &batch.id, RunMode::All).unwrap();
    assert_eq!(first.errors[0].kind, GenerationErrorKind::Storage);

    // Point the store at a usable root and retry.
    config.storage_root = dir.path().join("storage");
    let retry = run(&config, &batch.id, RunMode::FailedOnly).unwrap();
    assert_eq!(retry.total, 1);
    assert_eq!(retry.succeeded, 1);
    assert!(retry.errors.is_empty());

    let db = Database::open(&config.db_path).unwrap();
    let participant = &db.participants_by_batch(&batch.id).unwrap()[0];
    assert!(participant.storage_url.is_some());
}

#[test]
fn missing_batch_is_fatal_and_reported() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    Database::open(&config.db_path).unwrap();

    assert!(run(&config, "no-such-batch", RunMode::All).is_err());
}
