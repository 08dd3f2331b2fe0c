use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::fs;

use crate::clock::{Clock, SystemClock};

/// Size and last modification time of a stored blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobMeta {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error("{op} {key}: {source}")]
    Io {
        op: &'static str,
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed binary storage. Keys are flat names such as `qr-<hash>.png`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Replaces the whole blob; readers never observe a partial write
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError>;

    async fn read(&self, key: &str) -> Result<Option<Bytes>, BlobError>;

    /// Returns whether a blob was actually removed
    async fn delete(&self, key: &str) -> Result<bool, BlobError>;

    /// Keys matching a single-`*` pattern such as `qr-*.png`
    async fn list(&self, pattern: &str) -> Result<Vec<String>, BlobError>;

    async fn stat(&self, key: &str) -> Result<Option<BlobMeta>, BlobError>;

    /// Makes sure the store can accept writes
    async fn ensure_ready(&self) -> Result<(), BlobError>;

    /// Where the store keeps its blobs, for operators
    fn location(&self) -> String;

    /// Where one blob lives
    fn locate(&self, key: &str) -> String;
}

/// Matches `name` against a pattern with at most one `*` wildcard
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
        }
        None => pattern == name,
    }
}

fn validate_key(key: &str) -> Result<(), BlobError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(BlobError::InvalidKey(key.to_string()))
    }
}

// =============================================================================
// Filesystem
// =============================================================================

/// Stores each blob as one file in a directory
pub struct FsBlobStore {
    base_dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl FsBlobStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Gets the file path for a key
    pub fn entry_path(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_key(key)?;
        Ok(self.base_dir.join(key))
    }

    fn io_error(op: &'static str, key: &str, source: std::io::Error) -> BlobError {
        BlobError::Io {
            op,
            key: key.to_string(),
            source,
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let path = self.entry_path(key)?;

        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| Self::io_error("create dir for", key, e))?;

        // Write next to the target and rename over it
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp_path = self
            .base_dir
            .join(format!(".{}.{}.{}.tmp", key, std::process::id(), seq));

        if let Err(e) = fs::write(&tmp_path, bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Self::io_error("write", key, e));
        }

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Self::io_error("rename", key, e));
        }

        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>, BlobError> {
        let path = self.entry_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error("read", key, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error("delete", key, e)),
        }
    }

    async fn list(&self, pattern: &str) -> Result<Vec<String>, BlobError> {
        let mut dir = match fs::read_dir(&self.base_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error("list", pattern, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| Self::io_error("list", pattern, e))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if matches_pattern(pattern, name) {
                    keys.push(name.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn stat(&self, key: &str) -> Result<Option<BlobMeta>, BlobError> {
        let path = self.entry_path(key)?;
        let metadata = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error("stat", key, e)),
        };

        let modified = metadata
            .modified()
            .map_err(|e| Self::io_error("stat", key, e))?;

        Ok(Some(BlobMeta {
            size: metadata.len(),
            modified: DateTime::<Utc>::from(modified),
        }))
    }

    async fn ensure_ready(&self) -> Result<(), BlobError> {
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| Self::io_error("create", &self.location(), e))?;

        let metadata = fs::metadata(&self.base_dir)
            .await
            .map_err(|e| Self::io_error("stat", &self.location(), e))?;

        if metadata.permissions().readonly() {
            return Err(BlobError::Unavailable(format!(
                "{} is read-only",
                self.location()
            )));
        }

        Ok(())
    }

    fn location(&self) -> String {
        self.base_dir.display().to_string()
    }

    fn locate(&self, key: &str) -> String {
        self.base_dir.join(key).display().to_string()
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Keeps blobs in memory; modification times come from the injected clock
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, (Bytes, DateTime<Utc>)>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, (Bytes, DateTime<Utc>)>>, BlobError> {
        self.blobs
            .lock()
            .map_err(|_| BlobError::Unavailable("blob map lock poisoned".to_string()))
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        validate_key(key)?;
        let now = self.clock.now();
        self.lock()?
            .insert(key.to_string(), (Bytes::copy_from_slice(bytes), now));
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>, BlobError> {
        validate_key(key)?;
        Ok(self.lock()?.get(key).map(|(data, _)| data.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, BlobError> {
        validate_key(key)?;
        Ok(self.lock()?.remove(key).is_some())
    }

    async fn list(&self, pattern: &str) -> Result<Vec<String>, BlobError> {
        let mut keys: Vec<_> = self
            .lock()?
            .keys()
            .filter(|k| matches_pattern(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn stat(&self, key: &str) -> Result<Option<BlobMeta>, BlobError> {
        validate_key(key)?;
        Ok(self.lock()?.get(key).map(|(data, modified)| BlobMeta {
            size: data.len() as u64,
            modified: *modified,
        }))
    }

    async fn ensure_ready(&self) -> Result<(), BlobError> {
        self.lock().map(|_| ())
    }

    fn location(&self) -> String {
        "memory://qr".to_string()
    }

    fn locate(&self, key: &str) -> String {
        format!("memory://qr/{}", key)
    }
}
