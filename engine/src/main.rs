//! `certigen`: batch certificate generation from the command line.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;

use common::jobs::JobStatus;
use common::model::template::{ImageKind, SurfaceKind, Template};

use engine::db::Database;
use engine::error::{EngineError, Result};
use engine::job_controller::state::{start_job_updater, JobsState};
use engine::orchestrator::{
    create_batch, schedule_generation, schedule_regeneration, EngineConfig,
};
use engine::services::ingest::parse_rows;
use engine::services::storage::{
    FsObjectStore, LifecyclePolicy, StorageOrganizer,
};

#[derive(Parser)]
#[command(name = "certigen", about = "Certificate batch generation engine")]
struct Cli {
    /// SQLite database file.
    #[arg(long, default_value = "certigen.sqlite", global = true)]
    db: PathBuf,

    /// Root directory of the durable object store.
    #[arg(long, default_value = "storage", global = true)]
    storage_root: PathBuf,

    /// Directory local certificate copies are written under.
    #[arg(long, default_value = "certificates", global = true)]
    output_dir: PathBuf,

    /// Base URL stored objects are addressed by.
    #[arg(long, default_value = "file:///certigen", global = true)]
    base_url: String,

    /// Secret used to sign presigned retrieval URLs.
    #[arg(long, default_value = "certigen-dev-secret", global = true)]
    secret: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a certificate template from a surface file and a placement
    /// JSON document.
    RegisterTemplate {
        /// Template identifier.
        id: String,
        /// Human-readable template name.
        #[arg(long)]
        display_name: String,
        /// Background surface (.pdf, .png, .jpg or .jpeg).
        #[arg(long)]
        surface: PathBuf,
        /// Placement specification JSON.
        #[arg(long)]
        placement: PathBuf,
        /// Event categories this template serves.
        #[arg(long)]
        category: Vec<String>,
    },
    /// Create a batch from a participant CSV, assigning certificate IDs.
    CreateBatch {
        /// Batch name.
        name: String,
        /// Template to render with.
        #[arg(long)]
        template: String,
        /// Participant CSV (Name and Email columns required).
        #[arg(long)]
        csv: PathBuf,
        /// Certificate ID prefix, 2-10 uppercase letters.
        #[arg(long, default_value = "CERT")]
        prefix: String,
        /// Event categories for this batch.
        #[arg(long)]
        category: Vec<String>,
    },
    /// Generate certificates for every participant of a batch.
    Generate {
        batch_id: String,
    },
    /// Retry a batch, touching only participants without a certificate.
    Regenerate {
        batch_id: String,
    },
    /// Print storage statistics.
    Stats,
}

fn surface_kind_for(path: &Path) -> Result<SurfaceKind> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => Ok(SurfaceKind::Pdf),
        "png" => Ok(SurfaceKind::Image(ImageKind::Png)),
        "jpg" | "jpeg" => Ok(SurfaceKind::Image(ImageKind::Jpeg)),
        other => Err(EngineError::BatchFatal(format!(
            "unsupported surface type '.{other}'"
        ))),
    }
}

fn organizer(cli: &Cli) -> StorageOrganizer<FsObjectStore> {
    StorageOrganizer::new(
        FsObjectStore::new(&cli.storage_root),
        &cli.base_url,
        &cli.secret,
    )
}

fn engine_config(cli: &Cli) -> EngineConfig {
    EngineConfig {
        db_path: cli.db.clone(),
        storage_root: cli.storage_root.clone(),
        output_dir: cli.output_dir.clone(),
        base_url: cli.base_url.clone(),
        url_secret: cli.secret.clone(),
    }
}

/// Schedules a generation job and polls it to completion, printing progress.
async fn run_job(cli: &Cli, batch_id: String, regenerate: bool) -> Result<()> {
    let (state, rx) = JobsState::new();
    tokio::spawn(start_job_updater(state.clone(), rx));

    let config = engine_config(cli);
    let job_id = if regenerate {
        schedule_regeneration(&state, config, batch_id).await
    } else {
        schedule_generation(&state, config, batch_id).await
    };
    info!("scheduled job {job_id}");

    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        match state.status(&job_id).await {
            Some(JobStatus::InProgress(snapshot)) => {
                info!(
                    "progress {}/{} ({} ok, {} failed)",
                    snapshot.processed, snapshot.total, snapshot.succeeded, snapshot.failed
                );
            }
            Some(JobStatus::Completed(result)) => {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            Some(JobStatus::Failed(message)) => {
                return Err(EngineError::BatchFatal(message));
            }
            Some(JobStatus::Pending) | None => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let cli = Cli::parse();

    match &cli.command {
        Command::RegisterTemplate { id, display_name, surface, placement, category } => {
            let surface_kind = surface_kind_for(surface)?;
            let surface_bytes = fs::read(surface)?;
            let placement = serde_json::from_slice(&fs::read(placement)?)?;

            let db = Database::open(&cli.db)?;
            let template = Template {
                id: id.clone(),
                display_name: display_name.clone(),
                categories: category.clone(),
                surface_kind,
                surface_key: None,
                placement,
            };
            db.insert_template(&template, &surface_bytes)?;

            let organizer = organizer(&cli);
            let file_name = surface
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("surface");
            let content_type = match surface_kind {
                SurfaceKind::Pdf => "application/pdf",
                SurfaceKind::Image(ImageKind::Png) => "image/png",
                SurfaceKind::Image(ImageKind::Jpeg) => "image/jpeg",
            };
            let default_category = engine::services::storage::DEFAULT_CATEGORY.to_string();
            let key = organizer.upload_template(
                &surface_bytes,
                category.first().unwrap_or(&default_category),
                id,
                file_name,
                content_type,
            )?;
            db.set_template_surface_key(id, &key)?;
            organizer.install_lifecycle(&LifecyclePolicy::certificates())?;
            println!("registered template {id} (surface at {key})");
        }
        Command::CreateBatch { name, template, csv, prefix, category } => {
            let rows = parse_rows(fs::File::open(csv)?)?;
            let db = Database::open(&cli.db)?;
            let (batch, skipped) =
                create_batch(&db, name, category.clone(), template, rows, prefix)?;
            println!("created batch {}", batch.id);
            for error in &skipped {
                eprintln!("skipped '{}': {}", error.participant, error.message);
            }
        }
        Command::Generate { batch_id } => {
            run_job(&cli, batch_id.clone(), false).await?;
        }
        Command::Regenerate { batch_id } => {
            run_job(&cli, batch_id.clone(), true).await?;
        }
        Command::Stats => {
            let stats = organizer(&cli).stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
