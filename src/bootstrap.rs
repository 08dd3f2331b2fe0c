use actix_web::web;
use log::{info, warn};
use std::sync::Arc;

use crate::config::Config;
use crate::qr::{BlobError, BlobStore, FsBlobStore, PngQrEncoder, QrCache};
use crate::reporting::RecentErrors;
use crate::services::{MemoryRecorder, RateLimitService, ReferralRecorder};
use crate::store::MemoryCounterStore;

/// Shared components handed to every worker
#[derive(Clone)]
pub struct Services {
    pub rate_limiter: web::Data<RateLimitService>,
    pub qr_cache: web::Data<QrCache>,
    pub recorder: web::Data<dyn ReferralRecorder>,
    pub errors: web::Data<RecentErrors>,
}

impl Services {
    /// Wires the production components from configuration and prepares the
    /// QR cache directory
    pub async fn from_config(config: &Config) -> Result<Self, BlobError> {
        let errors = Arc::new(RecentErrors::default());

        let blob_store = FsBlobStore::new(config.qr.cache_dir.clone());
        blob_store.ensure_ready().await?;
        info!("QR cache directory: {}", blob_store.location());

        let rate_limiter = RateLimitService::new(
            Arc::new(MemoryCounterStore::new()),
            config.rate_limit.clone(),
            errors.clone(),
        );
        info!(
            "Rate limits: {} per visitor, {} global per {}s (store failure policy: {:?})",
            config.rate_limit.user_limit,
            config.rate_limit.global_limit,
            config.rate_limit.window.as_secs(),
            rate_limiter.policy()
        );

        let qr_cache = QrCache::new(Arc::new(blob_store), Arc::new(PngQrEncoder), errors.clone());

        if config.security.admin_token.is_none() {
            warn!("ADMIN_TOKEN not set, admin routes are disabled");
        }

        Ok(Self::new(
            rate_limiter,
            qr_cache,
            Arc::new(MemoryRecorder::new()),
            errors,
        ))
    }

    pub fn new(
        rate_limiter: RateLimitService,
        qr_cache: QrCache,
        recorder: Arc<dyn ReferralRecorder>,
        errors: Arc<RecentErrors>,
    ) -> Self {
        Self {
            rate_limiter: web::Data::new(rate_limiter),
            qr_cache: web::Data::new(qr_cache),
            recorder: web::Data::from(recorder),
            errors: web::Data::from(errors),
        }
    }

    /// Registers every component as app data
    pub fn register(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.rate_limiter.clone())
            .app_data(self.qr_cache.clone())
            .app_data(self.recorder.clone())
            .app_data(self.errors.clone());
    }
}
