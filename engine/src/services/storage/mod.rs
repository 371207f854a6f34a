//! Organized durable storage for rendered certificates and templates.
//!
//! Keys are deterministic and partitioned by generation date, sanitized
//! category and batch:
//! `certificates/{YYYY-MM-DD}/{category}/batch_{batchId}/{certificateId}.pdf`,
//! templates under `templates/{category}/`. Uploads carry descriptive
//! metadata and default to the infrequent-access class for cost control; a
//! lifecycle policy moves certificates through colder tiers at 30/90/365
//! days. Access happens through the [`ObjectStore`] trait; the filesystem
//! implementation keeps per-object metadata in a JSON sidecar.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub const CERTIFICATE_PREFIX: &str = "certificates";
pub const TEMPLATE_PREFIX: &str = "templates";

/// Default category when a batch carries no usable tag.
pub const DEFAULT_CATEGORY: &str = "general";

/// Default lifetime of a presigned retrieval URL.
pub const DEFAULT_URL_TTL_SECS: i64 = 3600;

const META_SUFFIX: &str = ".meta.json";
const LIFECYCLE_KEY: &str = "config/lifecycle.json";

/// Cost tier an object is stored under, coldest last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    Standard,
    InfrequentAccess,
    Archive,
    DeepArchive,
}

impl StorageClass {
    fn coldness(self) -> u8 {
        match self {
            StorageClass::Standard => 0,
            StorageClass::InfrequentAccess => 1,
            StorageClass::Archive => 2,
            StorageClass::DeepArchive => 3,
        }
    }
}

/// Per-object record kept alongside the stored bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub content_type: String,
    pub storage_class: StorageClass,
    /// Unix seconds at upload time.
    pub uploaded_at: i64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Minimal object-store surface the organizer needs.
pub trait ObjectStore {
    fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        class: StorageClass,
        metadata: BTreeMap<String, String>,
    ) -> Result<()>;
    fn get(&self, key: &str) -> Result<Vec<u8>>;
    fn head(&self, key: &str) -> Result<ObjectMeta>;
    fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;
    fn delete_prefix(&self, prefix: &str) -> Result<usize>;
    fn set_storage_class(&self, key: &str, class: StorageClass) -> Result<()>;
}

/// Filesystem-backed store: `{root}/{key}` for bytes, a `.meta.json`
/// sidecar per object.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> FsObjectStore {
        FsObjectStore { root: root.into() }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}{META_SUFFIX}"))
    }

    fn collect(&self, dir: &Path, out: &mut Vec<ObjectMeta>) -> Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                self.collect(&path, out)?;
            } else if path.to_string_lossy().ends_with(META_SUFFIX) {
                let meta: ObjectMeta = serde_json::from_slice(&fs::read(&path)?)?;
                out.push(meta);
            }
        }
        Ok(())
    }
}

impl ObjectStore for FsObjectStore {
    fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        class: StorageClass,
        metadata: BTreeMap<String, String>,
    ) -> Result<()> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        let meta = ObjectMeta {
            key: key.to_string(),
            size: bytes.len() as u64,
            content_type: content_type.to_string(),
            storage_class: class,
            uploaded_at: chrono::Utc::now().timestamp(),
            metadata,
        };
        fs::write(self.meta_path(key), serde_json::to_vec_pretty(&meta)?)?;
        debug!("stored {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        fs::read(self.object_path(key))
            .map_err(|e| EngineError::Storage(format!("get {key}: {e}")))
    }

    fn head(&self, key: &str) -> Result<ObjectMeta> {
        let bytes = fs::read(self.meta_path(key))
            .map_err(|e| EngineError::Storage(format!("head {key}: {e}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let mut out = Vec::new();
        self.collect(&self.root.join(prefix), &mut out)?;
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let removed = self.list(prefix)?.len();
        let dir = self.root.join(prefix);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(removed)
    }

    fn set_storage_class(&self, key: &str, class: StorageClass) -> Result<()> {
        let mut meta = self.head(key)?;
        meta.storage_class = class;
        fs::write(self.meta_path(key), serde_json::to_vec_pretty(&meta)?)?;
        Ok(())
    }
}

/// One tier transition: objects older than `after_days` move to `class`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleRule {
    pub after_days: i64,
    pub storage_class: StorageClass,
}

/// Tiering policy for the certificate prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    pub prefix: String,
    pub rules: Vec<LifecycleRule>,
}

impl LifecyclePolicy {
    /// The standard 30/90/365-day cold-down for certificates.
    pub fn certificates() -> LifecyclePolicy {
        LifecyclePolicy {
            prefix: CERTIFICATE_PREFIX.to_string(),
            rules: vec![
                LifecycleRule { after_days: 30, storage_class: StorageClass::InfrequentAccess },
                LifecycleRule { after_days: 90, storage_class: StorageClass::Archive },
                LifecycleRule { after_days: 365, storage_class: StorageClass::DeepArchive },
            ],
        }
    }

    fn class_for_age(&self, age_days: i64) -> Option<StorageClass> {
        self.rules
            .iter()
            .filter(|rule| age_days >= rule.after_days)
            .max_by_key(|rule| rule.after_days)
            .map(|rule| rule.storage_class)
    }
}

/// Aggregate size/count statistics across both prefixes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageStats {
    pub certificate_count: usize,
    pub certificate_bytes: u64,
    pub template_count: usize,
    pub template_bytes: u64,
}

/// Collapses a free-form category tag into a key-safe segment.
pub fn sanitize_category(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = true;
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let out = out.trim_end_matches('-').to_string();
    if out.is_empty() { DEFAULT_CATEGORY.to_string() } else { out }
}

/// Key for one rendered certificate.
pub fn certificate_key(
    generated_on: NaiveDate,
    category: &str,
    batch_id: &str,
    certificate_id: &str,
) -> String {
    format!(
        "{}/{}/{}/batch_{}/{}.pdf",
        CERTIFICATE_PREFIX,
        generated_on.format("%Y-%m-%d"),
        sanitize_category(category),
        batch_id,
        certificate_id
    )
}

/// Prefix shared by one batch's certificates.
pub fn batch_prefix(generated_on: NaiveDate, category: &str, batch_id: &str) -> String {
    format!(
        "{}/{}/{}/batch_{}",
        CERTIFICATE_PREFIX,
        generated_on.format("%Y-%m-%d"),
        sanitize_category(category),
        batch_id
    )
}

/// Prefix for a category's template surfaces.
pub fn template_prefix(category: &str) -> String {
    format!("{}/{}", TEMPLATE_PREFIX, sanitize_category(category))
}

/// The organizer proper: key derivation + metadata-rich uploads + signed
/// retrieval URLs over any [`ObjectStore`].
pub struct StorageOrganizer<S: ObjectStore> {
    store: S,
    base_url: String,
    secret: String,
}

impl<S: ObjectStore> StorageOrganizer<S> {
    pub fn new(store: S, base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        StorageOrganizer {
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stable (unsigned) locator for a stored object.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    /// Uploads one rendered certificate with descriptive metadata under the
    /// infrequent-access class, returning its key.
    #[allow(clippy::too_many_arguments)]
    pub fn upload_certificate(
        &self,
        bytes: &[u8],
        generated_on: NaiveDate,
        category: &str,
        batch_id: &str,
        certificate_id: &str,
        participant_name: &str,
        participant_email: &str,
    ) -> Result<String> {
        let key = certificate_key(generated_on, category, batch_id, certificate_id);
        let mut metadata = BTreeMap::new();
        metadata.insert("batch-id".to_string(), batch_id.to_string());
        metadata.insert("certificate-id".to_string(), certificate_id.to_string());
        metadata.insert("category".to_string(), sanitize_category(category));
        metadata.insert("participant-name".to_string(), participant_name.to_string());
        metadata.insert("participant-email".to_string(), participant_email.to_string());
        self.store.put(
            &key,
            bytes,
            "application/pdf",
            StorageClass::InfrequentAccess,
            metadata,
        )?;
        Ok(key)
    }

    /// Uploads a template surface under its category prefix.
    pub fn upload_template(
        &self,
        bytes: &[u8],
        category: &str,
        template_id: &str,
        file_name: &str,
        content_type: &str,
    ) -> Result<String> {
        let key = format!("{}/{}_{}", template_prefix(category), template_id, file_name);
        let mut metadata = BTreeMap::new();
        metadata.insert("template-id".to_string(), template_id.to_string());
        metadata.insert("category".to_string(), sanitize_category(category));
        self.store.put(&key, bytes, content_type, StorageClass::Standard, metadata)?;
        Ok(key)
    }

    /// Enumerates one batch's stored certificates.
    pub fn list_batch(
        &self,
        generated_on: NaiveDate,
        category: &str,
        batch_id: &str,
    ) -> Result<Vec<ObjectMeta>> {
        self.store.list(&batch_prefix(generated_on, category, batch_id))
    }

    /// Removes one batch's stored certificates, returning how many objects
    /// were deleted.
    pub fn delete_batch(
        &self,
        generated_on: NaiveDate,
        category: &str,
        batch_id: &str,
    ) -> Result<usize> {
        self.store.delete_prefix(&batch_prefix(generated_on, category, batch_id))
    }

    /// Time-limited retrieval URL for one stored object.
    pub fn presigned_url(&self, key: &str, ttl_secs: i64) -> Result<String> {
        // Fails early for keys that were never uploaded.
        self.store.head(key)?;
        let expires = chrono::Utc::now().timestamp() + ttl_secs;
        Ok(format!(
            "{}?expires={}&token={}",
            self.object_url(key),
            expires,
            self.sign(key, expires)
        ))
    }

    /// Presigns many keys at once, preserving order.
    pub fn presigned_urls(&self, keys: &[String], ttl_secs: i64) -> Result<Vec<String>> {
        keys.iter().map(|key| self.presigned_url(key, ttl_secs)).collect()
    }

    /// Checks a presigned token against the key, expiry and current time.
    pub fn verify_token(&self, key: &str, expires: i64, token: &str, now: i64) -> bool {
        now <= expires && self.sign(key, expires) == token
    }

    fn sign(&self, key: &str, expires: i64) -> String {
        let digest = md5::compute(format!("{}:{}:{}", self.secret, key, expires));
        URL_SAFE_NO_PAD.encode(digest.0)
    }

    /// Writes the lifecycle policy document into the store.
    pub fn install_lifecycle(&self, policy: &LifecyclePolicy) -> Result<()> {
        self.store.put(
            LIFECYCLE_KEY,
            &serde_json::to_vec_pretty(policy)?,
            "application/json",
            StorageClass::Standard,
            BTreeMap::new(),
        )
    }

    /// Re-tiers certificate objects per `policy`, returning how many moved.
    pub fn apply_lifecycle(&self, policy: &LifecyclePolicy, now: i64) -> Result<usize> {
        let mut moved = 0;
        for meta in self.store.list(&policy.prefix)? {
            let age_days = (now - meta.uploaded_at) / 86_400;
            if let Some(target) = policy.class_for_age(age_days) {
                if target.coldness() > meta.storage_class.coldness() {
                    self.store.set_storage_class(&meta.key, target)?;
                    moved += 1;
                }
            }
        }
        Ok(moved)
    }

    /// Aggregate statistics across the certificate and template prefixes.
    pub fn stats(&self) -> Result<StorageStats> {
        let mut stats = StorageStats::default();
        for meta in self.store.list(CERTIFICATE_PREFIX)? {
            stats.certificate_count += 1;
            stats.certificate_bytes += meta.size;
        }
        for meta in self.store.list(TEMPLATE_PREFIX)? {
            stats.template_count += 1;
            stats.template_bytes += meta.size;
        }
        Ok(stats)
    }
}
