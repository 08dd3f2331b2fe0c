pub mod rate_limit;
pub mod recorder;

pub use rate_limit::{
    parse_visitor_count, Decision, FailurePolicy, QuotaExceeded, QuotaScope, RateLimitService,
    GLOBAL_COUNTER_KEY,
};
pub use recorder::{MemoryRecorder, ReferralRecorder, RECENT_VISITS_CAPACITY};
