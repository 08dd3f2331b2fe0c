use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use log::Level;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::encoder::{EncodeError, ErrorCorrection, QrEncoder};
use super::storage::BlobStore;
use crate::clock::{Clock, SystemClock};
use crate::reporting::ErrorReporter;

/// Entries this small cannot be a real PNG QR code
pub const MIN_VALID_ENTRY_BYTES: u64 = 100;

/// Every key the cache writes matches this
pub const ENTRY_PATTERN: &str = "qr-*.png";

/// Quiet zone around rendered codes, in modules
pub const QR_MARGIN: u32 = 2;

/// Default age after which `prune` removes entries
pub const DEFAULT_PRUNE_DAYS: u32 = 90;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("cache read failed: {0}")]
    Read(String),

    #[error("cache write failed: {0}")]
    Write(String),

    #[error("generated image is invalid ({size} bytes)")]
    InvalidOutput { size: u64 },
}

/// A QR image served from or freshly written to the cache
#[derive(Debug, Clone)]
pub struct QrAsset {
    pub key: String,
    pub location: String,
    pub bytes: Bytes,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub total_size_bytes: u64,
    pub size_formatted: String,
    pub storage_location: String,
}

/// Cache key for a referral code at a given size.
///
/// The target URL is deliberately not part of the key: changing the base URL
/// keeps serving images cached for the old one until they are invalidated.
pub fn cache_key(referral_code: &str, size: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(referral_code.as_bytes());
    hasher.update(size.to_string().as_bytes());
    format!("qr-{:x}.png", hasher.finalize())
}

/// Appends the referral code to `base_url` as the `r` query parameter
pub fn build_target_url(base_url: &str, referral_code: &str) -> String {
    let mut url = base_url.to_string();
    if !url.ends_with('/') && !url.contains('?') {
        url.push('/');
    }

    let separator = if url.contains('?') { '&' } else { '?' };
    let encoded: String = url::form_urlencoded::byte_serialize(referral_code.as_bytes()).collect();

    format!("{}{}r={}", url, separator, encoded)
}

/// Module edge in pixels for a requested image size
pub fn pixel_scale(size: u32) -> u32 {
    size.div_ceil(100).clamp(4, 10)
}

/// Human-readable byte count (1024-based)
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        let rounded = format!("{:.1}", value);
        let trimmed = rounded.trim_end_matches(".0");
        format!("{} {}", trimmed, UNITS[unit])
    }
}

/// Memoizes rendered QR images in a blob store.
///
/// Every entry is a pure function of its key, so concurrent misses for the
/// same key may both render; the last write wins.
pub struct QrCache {
    store: Arc<dyn BlobStore>,
    encoder: Arc<dyn QrEncoder>,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
}

impl QrCache {
    pub fn new(
        store: Arc<dyn BlobStore>,
        encoder: Arc<dyn QrEncoder>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            store,
            encoder,
            reporter,
            clock: Arc::new(SystemClock),
        }
    }

    /// Uses `clock` as "now" when pruning
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Returns the cached image for `referral_code` at `size`, rendering and
    /// storing it first on a miss. Undersized entries are treated as corrupt
    /// and replaced.
    ///
    /// `referral_code` must already be validated and `size` clamped.
    pub async fn get_or_generate(
        &self,
        referral_code: &str,
        base_url: &str,
        size: u32,
    ) -> Result<QrAsset, CacheError> {
        let key = cache_key(referral_code, size);

        if let Some(bytes) = self.read_valid(&key).await? {
            return Ok(QrAsset {
                location: self.store.locate(&key),
                key,
                bytes,
                cache_hit: true,
            });
        }

        let target = build_target_url(base_url, referral_code);
        let png = self.render(target, size).await?;

        self.store.write(&key, &png).await.map_err(|e| {
            self.report(Level::Error, "QrCache::get_or_generate", &e.to_string());
            CacheError::Write(e.to_string())
        })?;

        // Verify what actually landed in the store
        let written = self
            .store
            .stat(&key)
            .await
            .map_err(|e| CacheError::Read(e.to_string()))?
            .map(|m| m.size)
            .unwrap_or(0);

        if written <= MIN_VALID_ENTRY_BYTES {
            self.report(
                Level::Error,
                "QrCache::get_or_generate",
                &format!("QR code generation failed: {} holds {} bytes", key, written),
            );
            return Err(CacheError::InvalidOutput { size: written });
        }

        log::debug!("Rendered QR {} for '{}' at {}px", key, referral_code, size);

        Ok(QrAsset {
            location: self.store.locate(&key),
            key,
            bytes: Bytes::from(png),
            cache_hit: false,
        })
    }

    /// Reads a cached entry, deleting it if it is too small to be valid
    async fn read_valid(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let meta = self
            .store
            .stat(key)
            .await
            .map_err(|e| CacheError::Read(e.to_string()))?;

        let Some(meta) = meta else {
            return Ok(None);
        };

        if meta.size > MIN_VALID_ENTRY_BYTES {
            let bytes = self
                .store
                .read(key)
                .await
                .map_err(|e| CacheError::Read(e.to_string()))?;

            // Another worker may have deleted it between stat and read
            return Ok(bytes.filter(|b| b.len() as u64 > MIN_VALID_ENTRY_BYTES));
        }

        self.report(
            Level::Warn,
            "QrCache::get_or_generate",
            &format!("corrupt cache entry {} ({} bytes), regenerating", key, meta.size),
        );
        if let Err(e) = self.store.delete(key).await {
            self.report(Level::Warn, "QrCache::get_or_generate", &e.to_string());
        }

        Ok(None)
    }

    async fn render(&self, target: String, size: u32) -> Result<Vec<u8>, CacheError> {
        let encoder = Arc::clone(&self.encoder);
        let scale = pixel_scale(size);

        let result = tokio::task::spawn_blocking(move || {
            encoder.encode(&target, ErrorCorrection::Low, scale, QR_MARGIN)
        })
        .await
        .map_err(|e| CacheError::Encode(format!("encoder task failed: {}", e)))?;

        result.map_err(|e| {
            self.report(Level::Error, "QrCache::render", &e.to_string());
            match e {
                EncodeError::Unavailable(msg) => CacheError::EncoderUnavailable(msg),
                other => CacheError::Encode(other.to_string()),
            }
        })
    }

    /// Removes one entry. True unless an existing entry could not be deleted.
    pub async fn invalidate(&self, referral_code: &str, size: u32) -> bool {
        let key = cache_key(referral_code, size);
        match self.store.delete(&key).await {
            Ok(_) => true,
            Err(e) => {
                self.report(Level::Warn, "QrCache::invalidate", &e.to_string());
                false
            }
        }
    }

    /// Removes every entry; returns the number actually deleted
    pub async fn clear_all(&self) -> usize {
        let keys = match self.store.list(ENTRY_PATTERN).await {
            Ok(keys) => keys,
            Err(e) => {
                self.report(Level::Error, "QrCache::clear_all", &e.to_string());
                return 0;
            }
        };

        let mut deleted = 0;
        for key in keys {
            match self.store.delete(&key).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => self.report(Level::Warn, "QrCache::clear_all", &e.to_string()),
            }
        }

        log::info!("Cleared {} QR cache entries", deleted);
        deleted
    }

    /// Removes entries last modified more than `older_than_days` ago
    pub async fn prune(&self, older_than_days: u32) -> usize {
        // Thresholds before the earliest representable time keep everything
        let threshold = TimeDelta::try_days(i64::from(older_than_days))
            .and_then(|age| self.clock.now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let keys = match self.store.list(ENTRY_PATTERN).await {
            Ok(keys) => keys,
            Err(e) => {
                self.report(Level::Error, "QrCache::prune", &e.to_string());
                return 0;
            }
        };

        let mut deleted = 0;
        for key in keys {
            let meta = match self.store.stat(&key).await {
                Ok(Some(meta)) => meta,
                Ok(None) => continue,
                Err(e) => {
                    self.report(Level::Warn, "QrCache::prune", &e.to_string());
                    continue;
                }
            };

            if meta.modified >= threshold {
                continue;
            }

            match self.store.delete(&key).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => self.report(Level::Warn, "QrCache::prune", &e.to_string()),
            }
        }

        if deleted > 0 {
            log::info!(
                "Pruned {} QR cache entries older than {} days",
                deleted,
                older_than_days
            );
        }
        deleted
    }

    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let keys = self
            .store
            .list(ENTRY_PATTERN)
            .await
            .map_err(|e| CacheError::Read(e.to_string()))?;

        let mut count = 0;
        let mut total_size_bytes = 0;
        for key in &keys {
            // Entries vanishing mid-scan are simply not counted
            if let Ok(Some(meta)) = self.store.stat(key).await {
                count += 1;
                total_size_bytes += meta.size;
            }
        }

        Ok(CacheStats {
            count,
            total_size_bytes,
            size_formatted: format_size(total_size_bytes),
            storage_location: self.store.location(),
        })
    }

    fn report(&self, level: Level, source: &str, message: &str) {
        self.reporter.report(level, source, message);
    }
}
