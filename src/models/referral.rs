use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest referral code accepted anywhere
pub const MAX_REFERRAL_CODE_LEN: usize = 100;

/// Referral codes are 1 to 100 chars of `[a-zA-Z0-9_-]`
pub fn is_valid_referral_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= MAX_REFERRAL_CODE_LEN
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ios" => Some(Platform::Ios),
            "android" => Some(Platform::Android),
            _ => None,
        }
    }
}

/// Body of POST /api/track/click
///
/// Fields stay strings so that invalid values produce our validation
/// messages instead of a generic JSON error.
#[derive(Debug, Deserialize)]
pub struct TrackClickRequest {
    pub referral_code: Option<String>,
    pub platform: Option<String>,
}

/// Per-code tallies exposed to operators
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferralStats {
    pub referral_code: String,
    pub visits: u64,
    pub clicks: u64,
    pub ios_clicks: u64,
    pub android_clicks: u64,
    /// Clicks per visit, in percent
    pub click_rate: f64,
    /// Time of the latest recorded visit
    pub last_used: Option<DateTime<Utc>>,
}

/// One recorded visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitRecord {
    pub referral_code: String,
    pub landing_path: String,
    pub created_at: DateTime<Utc>,
}

/// Dashboard view over everything recorded so far
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralSummary {
    pub total_visits: u64,
    /// Codes with at least one visit
    pub unique_referrals: usize,
    pub total_clicks: u64,
    /// Visits since midnight UTC
    pub today_visits: u64,
    /// Most visited codes first
    pub top_referrals: Vec<ReferralStats>,
    /// Newest first
    pub recent_activity: Vec<VisitRecord>,
}

/// Percentage of visits followed by a click; zero without visits
pub fn click_rate(visits: u64, clicks: u64) -> f64 {
    if visits == 0 {
        return 0.0;
    }
    clicks as f64 / visits as f64 * 100.0
}
