use log::Level;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitConfig;
use crate::reporting::ErrorReporter;
use crate::store::CounterStore;

/// Store key of the site-wide counter
pub const GLOBAL_COUNTER_KEY: &str = "reftrak_global_rate_limit";

/// Result when quota is exceeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaExceeded {
    /// Seconds until the quota resets
    pub retry_after: u64,
    /// Which budget triggered the limit
    pub scope: QuotaScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaScope {
    Visitor,
    Global,
}

impl QuotaScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaScope::Visitor => "visitor",
            QuotaScope::Global => "global",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The caller must hand `next_visitor_count` back to the visitor with a
    /// fresh window, the limiter keeps no per-visitor state
    Admit { next_visitor_count: u64 },
    Reject(QuotaExceeded),
}

impl Decision {
    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit { .. })
    }
}

/// What to do when the counter store cannot be read or written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Admit; an outage of the store disables the global budget
    Open,
    /// Reject; an outage of the store turns away every request
    Closed,
}

impl FailurePolicy {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        if config.fail_closed {
            FailurePolicy::Closed
        } else {
            FailurePolicy::Open
        }
    }
}

/// Two-layer limiter: a per-visitor count carried by the client and a
/// site-wide count kept in the counter store, both reset every window.
pub struct RateLimitService {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
    policy: FailurePolicy,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
}

impl RateLimitService {
    pub fn new(
        store: Arc<dyn CounterStore>,
        config: RateLimitConfig,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            store,
            policy: FailurePolicy::from_config(&config),
            config,
            reporter,
            clock: Arc::new(SystemClock),
        }
    }

    /// Uses `clock` for Retry-After computations; it should be the clock the store runs on
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Decides whether a tracking request from a visitor who has already made
    /// `visitor_count` requests this window may proceed.
    /// Admitting increments the global counter.
    pub async fn check(&self, visitor_count: u64) -> Decision {
        let window_secs = self.config.window.as_secs().max(1);

        // 1. Per-visitor budget (no I/O)
        if visitor_count >= self.config.user_limit {
            return Decision::Reject(QuotaExceeded {
                retry_after: window_secs,
                scope: QuotaScope::Visitor,
            });
        }

        // 2. Global budget
        match self.store.get(GLOBAL_COUNTER_KEY).await {
            Ok(Some(counter)) if counter.value >= self.config.global_limit => {
                return Decision::Reject(QuotaExceeded {
                    retry_after: counter.seconds_remaining(self.clock.now()),
                    scope: QuotaScope::Global,
                });
            }
            Ok(_) => {}
            Err(e) => return self.on_store_failure(visitor_count, &e.to_string()),
        }

        // 3. Count the admitted request
        if let Err(e) = self
            .store
            .increment_or_init(GLOBAL_COUNTER_KEY, self.config.window)
            .await
        {
            return self.on_store_failure(visitor_count, &e.to_string());
        }

        Decision::Admit {
            next_visitor_count: visitor_count.saturating_add(1),
        }
    }

    fn on_store_failure(&self, visitor_count: u64, error: &str) -> Decision {
        match self.policy {
            FailurePolicy::Open => {
                self.reporter.report(
                    Level::Warn,
                    "RateLimitService::check",
                    &format!("counter store failed, admitting without global budget: {}", error),
                );
                Decision::Admit {
                    next_visitor_count: visitor_count.saturating_add(1),
                }
            }
            FailurePolicy::Closed => {
                self.reporter.report(
                    Level::Error,
                    "RateLimitService::check",
                    &format!("counter store failed, rejecting request: {}", error),
                );
                Decision::Reject(QuotaExceeded {
                    retry_after: self.config.window.as_secs().max(1),
                    scope: QuotaScope::Global,
                })
            }
        }
    }
}

/// Reads a visitor count as carried in a cookie. Anything that is not a
/// non-negative integer counts as a fresh visitor.
pub fn parse_visitor_count(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok()).unwrap_or(0)
}
