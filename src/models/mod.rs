pub mod referral;

pub use referral::{
    click_rate, is_valid_referral_code, Platform, ReferralStats, ReferralSummary,
    TrackClickRequest, VisitRecord, MAX_REFERRAL_CODE_LEN,
};
