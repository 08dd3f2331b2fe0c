use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::qr::QrCache;

/// Removes stale QR images once
pub async fn prune_once(cache: &QrCache, older_than_days: u32) -> usize {
    let deleted = cache.prune(older_than_days).await;
    log::debug!("Housekeeping pass removed {} QR cache entries", deleted);
    deleted
}

/// Prunes the QR cache every `period`, forever. The first pass runs right away.
pub async fn run_prune_loop(cache: Arc<QrCache>, period: Duration, older_than_days: u32) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log::info!(
        "QR cache housekeeping every {}s (entries older than {} days)",
        period.as_secs(),
        older_than_days
    );

    loop {
        ticker.tick().await;
        prune_once(&cache, older_than_days).await;
    }
}
