//! SQLite persistence: template/batch/participant repositories and the
//! append-only certificate-ID ledger.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use common::model::batch::{Batch, BatchStatus};
use common::model::ledger::CertificateIdLogEntry;
use common::model::participant::Participant;
use common::model::placement::PlacementSpec;
use common::model::template::{SurfaceKind, Template};

use crate::error::{EngineError, Result};
use crate::services::certificate_id::IdRegistry;

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;
CREATE TABLE IF NOT EXISTS templates (
    id            TEXT PRIMARY KEY,
    display_name  TEXT NOT NULL,
    categories    TEXT NOT NULL,
    surface_kind  TEXT NOT NULL,
    surface_key   TEXT,
    placement     TEXT NOT NULL,
    surface       BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS batches (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    categories      TEXT NOT NULL,
    template_id     TEXT NOT NULL REFERENCES templates(id),
    status          TEXT NOT NULL,
    generated_count INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS participants (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    email          TEXT NOT NULL,
    certificate_id TEXT NOT NULL UNIQUE,
    sr_no          INTEGER NOT NULL,
    batch_id       TEXT NOT NULL REFERENCES batches(id) ON DELETE CASCADE,
    local_path     TEXT,
    storage_url    TEXT
);
CREATE TABLE IF NOT EXISTS certificate_id_log (
    certificate_id TEXT PRIMARY KEY,
    batch_id       TEXT NOT NULL,
    prefix         TEXT NOT NULL,
    issued_on      TEXT NOT NULL
);
";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Database> {
        Database::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Database> {
        Database::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Database> {
        conn.execute_batch(SCHEMA)?;
        Ok(Database { conn })
    }

    // --- templates ---

    pub fn insert_template(&self, template: &Template, surface: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO templates (id, display_name, categories, surface_kind, surface_key, placement, surface)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                template.id,
                template.display_name,
                serde_json::to_string(&template.categories)?,
                template.surface_kind.tag(),
                template.surface_key,
                serde_json::to_string(&template.placement)?,
                surface,
            ],
        )?;
        Ok(())
    }

    pub fn get_template(&self, id: &str) -> Result<Template> {
        let row: Option<(String, String, String, Option<String>, String)> = self
            .conn
            .query_row(
                "SELECT display_name, categories, surface_kind, surface_key, placement
                 FROM templates WHERE id = ?1",
                [id],
                |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                },
            )
            .optional()?;
        let (display_name, categories, kind_tag, surface_key, placement) =
            row.ok_or_else(|| EngineError::BatchFatal(format!("template '{id}' not found")))?;
        let surface_kind = SurfaceKind::from_tag(&kind_tag).ok_or_else(|| {
            EngineError::BatchFatal(format!("template '{id}' has unknown surface kind '{kind_tag}'"))
        })?;
        let placement: PlacementSpec = serde_json::from_str(&placement)?;
        Ok(Template {
            id: id.to_string(),
            display_name,
            categories: serde_json::from_str(&categories)?,
            surface_kind,
            surface_key,
            placement,
        })
    }

    pub fn template_surface(&self, id: &str) -> Result<Vec<u8>> {
        self.conn
            .query_row("SELECT surface FROM templates WHERE id = ?1", [id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| EngineError::BatchFatal(format!("template '{id}' not found")))
    }

    pub fn set_template_surface_key(&self, id: &str, key: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE templates SET surface_key = ?1 WHERE id = ?2",
            params![key, id],
        )?;
        Ok(())
    }

    // --- batches ---

    pub fn insert_batch(&self, batch: &Batch) -> Result<()> {
        self.conn.execute(
            "INSERT INTO batches (id, name, categories, template_id, status, generated_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                batch.id,
                batch.name,
                serde_json::to_string(&batch.categories)?,
                batch.template_id,
                batch.status.as_str(),
                batch.generated_count,
            ],
        )?;
        Ok(())
    }

    pub fn get_batch(&self, id: &str) -> Result<Batch> {
        let row: Option<(String, String, String, String, u32)> = self
            .conn
            .query_row(
                "SELECT name, categories, template_id, status, generated_count
                 FROM batches WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        let (name, categories, template_id, status, generated_count) =
            row.ok_or_else(|| EngineError::BatchFatal(format!("batch '{id}' not found")))?;
        let status = BatchStatus::from_str(&status)
            .ok_or_else(|| EngineError::BatchFatal(format!("batch '{id}' has unknown status '{status}'")))?;
        Ok(Batch {
            id: id.to_string(),
            name,
            categories: serde_json::from_str(&categories)?,
            template_id,
            status,
            generated_count,
        })
    }

    pub fn update_batch_status(&self, id: &str, status: BatchStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE batches SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    pub fn increment_generated(&self, id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE batches SET generated_count = generated_count + 1 WHERE id = ?1",
            [id],
        )?;
        Ok(())
    }

    /// Removes a batch and, by cascade, its participants.
    pub fn delete_batch(&self, id: &str) -> Result<()> {
        self.conn.execute("DELETE FROM batches WHERE id = ?1", [id])?;
        Ok(())
    }

    // --- participants ---

    pub fn insert_participant(&self, participant: &Participant) -> Result<()> {
        self.conn.execute(
            "INSERT INTO participants (id, name, email, certificate_id, sr_no, batch_id, local_path, storage_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                participant.id,
                participant.name,
                participant.email,
                participant.certificate_id,
                participant.sr_no,
                participant.batch_id,
                participant.local_path,
                participant.storage_url,
            ],
        )?;
        Ok(())
    }

    pub fn participants_by_batch(&self, batch_id: &str) -> Result<Vec<Participant>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, email, certificate_id, sr_no, local_path, storage_url
             FROM participants WHERE batch_id = ?1 ORDER BY sr_no",
        )?;
        let rows = stmt.query_map([batch_id], |row| {
            Ok(Participant {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                certificate_id: row.get(3)?,
                sr_no: row.get(4)?,
                batch_id: batch_id.to_string(),
                local_path: row.get(5)?,
                storage_url: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn update_participant_paths(
        &self,
        id: &str,
        local_path: Option<&str>,
        storage_url: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE participants SET local_path = ?1, storage_url = ?2 WHERE id = ?3",
            params![local_path, storage_url, id],
        )?;
        Ok(())
    }
}

/// The durable ledger: uniqueness is enforced by the primary key, so a lost
/// race against a concurrent batch shows up as `record` returning `false`.
impl IdRegistry for Database {
    fn exists(&self, certificate_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM certificate_id_log WHERE certificate_id = ?1",
                [certificate_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn record(&self, entry: &CertificateIdLogEntry) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO certificate_id_log (certificate_id, batch_id, prefix, issued_on)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.certificate_id, entry.batch_id, entry.prefix, entry.issued_on],
        )?;
        Ok(inserted == 1)
    }
}
