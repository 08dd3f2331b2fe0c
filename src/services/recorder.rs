use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::{Clock, SystemClock};
use crate::error::{AppError, AppResult};
use crate::models::{click_rate, Platform, ReferralStats, ReferralSummary, VisitRecord};

/// Visits kept for the recent activity view
pub const RECENT_VISITS_CAPACITY: usize = 500;

/// Where admitted visits and clicks end up
#[async_trait]
pub trait ReferralRecorder: Send + Sync {
    async fn record_visit(&self, referral_code: &str, landing_path: &str) -> AppResult<()>;

    async fn record_click(&self, referral_code: &str, platform: Platform) -> AppResult<()>;

    /// Totals, the `top_limit` most visited codes and the `recent_limit`
    /// latest visits
    async fn summary(&self, top_limit: usize, recent_limit: usize) -> AppResult<ReferralSummary>;
}

#[derive(Debug, Default)]
struct CodeTally {
    visits: u64,
    ios_clicks: u64,
    android_clicks: u64,
    last_used: Option<DateTime<Utc>>,
}

impl CodeTally {
    fn clicks(&self) -> u64 {
        self.ios_clicks + self.android_clicks
    }
}

#[derive(Debug, Default)]
struct Tallies {
    by_code: HashMap<String, CodeTally>,
    total_visits: u64,
    total_clicks: u64,
    /// Visits on the most recent day seen
    day: Option<(NaiveDate, u64)>,
    recent: VecDeque<VisitRecord>,
}

/// Keeps tallies and the latest visits in process memory; lost on restart
pub struct MemoryRecorder {
    tallies: Mutex<Tallies>,
    clock: Arc<dyn Clock>,
    recent_capacity: usize,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tallies: Mutex::new(Tallies::default()),
            clock,
            recent_capacity: RECENT_VISITS_CAPACITY,
        }
    }

    /// Keeps at most `capacity` visits for the recent activity view
    pub fn with_recent_capacity(mut self, capacity: usize) -> Self {
        self.recent_capacity = capacity;
        self
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Tallies>> {
        self.tallies
            .lock()
            .map_err(|_| AppError::Storage("referral tallies lock poisoned".to_string()))
    }
}

impl Default for MemoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReferralRecorder for MemoryRecorder {
    async fn record_visit(&self, referral_code: &str, landing_path: &str) -> AppResult<()> {
        let now = self.clock.now();
        let today = now.date_naive();
        let mut tallies = self.lock()?;

        let tally = tallies.by_code.entry(referral_code.to_string()).or_default();
        tally.visits += 1;
        tally.last_used = Some(now);
        tallies.total_visits += 1;

        tallies.day = match tallies.day {
            Some((day, count)) if day == today => Some((day, count + 1)),
            _ => Some((today, 1)),
        };

        if self.recent_capacity > 0 {
            if tallies.recent.len() >= self.recent_capacity {
                tallies.recent.pop_front();
            }
            tallies.recent.push_back(VisitRecord {
                referral_code: referral_code.to_string(),
                landing_path: landing_path.to_string(),
                created_at: now,
            });
        }

        log::debug!("Recorded visit for {} at {}", referral_code, landing_path);
        Ok(())
    }

    async fn record_click(&self, referral_code: &str, platform: Platform) -> AppResult<()> {
        let mut tallies = self.lock()?;

        let tally = tallies.by_code.entry(referral_code.to_string()).or_default();
        match platform {
            Platform::Ios => tally.ios_clicks += 1,
            Platform::Android => tally.android_clicks += 1,
        }
        tallies.total_clicks += 1;

        log::debug!("Recorded {:?} click for {}", platform, referral_code);
        Ok(())
    }

    async fn summary(&self, top_limit: usize, recent_limit: usize) -> AppResult<ReferralSummary> {
        let today = self.clock.now().date_naive();
        let tallies = self.lock()?;

        let mut top_referrals: Vec<ReferralStats> = tallies
            .by_code
            .iter()
            .map(|(code, tally)| ReferralStats {
                referral_code: code.clone(),
                visits: tally.visits,
                clicks: tally.clicks(),
                ios_clicks: tally.ios_clicks,
                android_clicks: tally.android_clicks,
                click_rate: click_rate(tally.visits, tally.clicks()),
                last_used: tally.last_used,
            })
            .collect();
        top_referrals.sort_by(|a, b| {
            b.visits
                .cmp(&a.visits)
                .then(b.clicks.cmp(&a.clicks))
                .then_with(|| a.referral_code.cmp(&b.referral_code))
        });
        top_referrals.truncate(top_limit);

        let today_visits = match tallies.day {
            Some((day, count)) if day == today => count,
            _ => 0,
        };

        Ok(ReferralSummary {
            total_visits: tallies.total_visits,
            unique_referrals: tallies.by_code.values().filter(|t| t.visits > 0).count(),
            total_clicks: tallies.total_clicks,
            today_visits,
            top_referrals,
            recent_activity: tallies.recent.iter().rev().take(recent_limit).cloned().collect(),
        })
    }
}
