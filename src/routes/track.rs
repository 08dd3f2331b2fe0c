use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{is_valid_referral_code, Platform, TrackClickRequest};
use crate::services::{
    parse_visitor_count, Decision, QuotaExceeded, RateLimitService, ReferralRecorder,
};

/// Per-visitor request count for the current window
pub const RATE_LIMIT_COOKIE: &str = "reftrak_rate_limit_user";

/// Referral code the visitor arrived with
pub const REFERRAL_COOKIE: &str = "reftrak_referral";

const TRACKED_COOKIE_PREFIX: &str = "reftrak_tracked_";

/// Longest landing path kept with a visit
const MAX_LANDING_PATH_LEN: usize = 500;

#[derive(Debug, Deserialize)]
pub struct VisitQuery {
    pub r: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VisitResponse {
    pub referral_code: String,
    pub recorded: bool,
}

#[derive(Debug, Serialize)]
pub struct ClickResponse {
    pub message: &'static str,
}

/// Name of the cookie marking a referral code as already counted for this visitor
pub fn tracked_cookie_name(referral_code: &str) -> String {
    let digest = Sha256::digest(referral_code.as_bytes());
    format!("{}{}", TRACKED_COOKIE_PREFIX, &hex::encode(digest)[..16])
}

fn cookie(config: &Config, name: String, value: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.security.ssl_proxy)
        .max_age(time::Duration::seconds(max_age_secs))
        .finish()
}

fn cookie_days_secs(config: &Config) -> i64 {
    i64::from(config.tracking.cookie_days) * 24 * 60 * 60
}

/// 429 with Retry-After, the same shape for both budgets
pub fn too_many_requests(exceeded: &QuotaExceeded) -> HttpResponse {
    HttpResponse::TooManyRequests()
        .insert_header(("Retry-After", exceeded.retry_after.to_string()))
        .json(serde_json::json!({
            "error": "rate_limit_exceeded",
            "scope": exceeded.scope.as_str(),
            "retry_after": exceeded.retry_after
        }))
}

/// Runs the rate limiter for a request. On admission returns the cookie
/// carrying the visitor's new count.
async fn admit(
    req: &HttpRequest,
    config: &Config,
    limiter: &RateLimitService,
) -> Result<Cookie<'static>, HttpResponse> {
    let raw = req.cookie(RATE_LIMIT_COOKIE);
    let visitor_count = parse_visitor_count(raw.as_ref().map(|c| c.value()));

    match limiter.check(visitor_count).await {
        Decision::Admit { next_visitor_count } => Ok(cookie(
            config,
            RATE_LIMIT_COOKIE.to_string(),
            next_visitor_count.to_string(),
            limiter.config().window.as_secs() as i64,
        )),
        Decision::Reject(exceeded) => {
            log::warn!(
                "Tracking request rejected ({} limit): retry_after={}s",
                exceeded.scope.as_str(),
                exceeded.retry_after
            );
            Err(too_many_requests(&exceeded))
        }
    }
}

/// GET /api/track/visit?r={code}
///
/// Records the first visit of a visitor for a referral code and remembers the
/// code in a cookie. Without `r`, an existing referral cookie is kept as is;
/// otherwise the configured default referral is used.
pub async fn track_visit(
    req: HttpRequest,
    query: web::Query<VisitQuery>,
    config: web::Data<Config>,
    limiter: web::Data<RateLimitService>,
    recorder: web::Data<dyn ReferralRecorder>,
) -> AppResult<HttpResponse> {
    let query = query.into_inner();
    let requested = query.r.filter(|r| !r.is_empty());

    // Malformed requests never reach the limiter
    if let Some(code) = &requested {
        if !is_valid_referral_code(code) {
            return Err(AppError::Validation(
                "Invalid referral code format".to_string(),
            ));
        }
    }

    let rate_cookie = match admit(&req, &config, &limiter).await {
        Ok(cookie) => cookie,
        Err(rejection) => return Ok(rejection),
    };

    let referral_code = match requested {
        Some(code) => code,
        None => {
            let existing = req
                .cookie(REFERRAL_COOKIE)
                .map(|c| c.value().to_string())
                .filter(|v| is_valid_referral_code(v));

            if let Some(existing) = existing {
                // Visitor already attributed, don't override
                return Ok(HttpResponse::Ok().cookie(rate_cookie).json(VisitResponse {
                    referral_code: existing,
                    recorded: false,
                }));
            }
            config.tracking.default_referral.clone()
        }
    };

    let tracked_name = tracked_cookie_name(&referral_code);
    let already_tracked = req.cookie(&tracked_name).is_some();

    let mut response = HttpResponse::Ok();
    response.cookie(rate_cookie);

    if !already_tracked {
        let landing_path: String = query
            .path
            .unwrap_or_default()
            .chars()
            .take(MAX_LANDING_PATH_LEN)
            .collect();

        recorder.record_visit(&referral_code, &landing_path).await?;

        response.cookie(cookie(
            &config,
            tracked_name,
            chrono::Utc::now().timestamp().to_string(),
            cookie_days_secs(&config),
        ));
    }

    response.cookie(cookie(
        &config,
        REFERRAL_COOKIE.to_string(),
        referral_code.clone(),
        cookie_days_secs(&config),
    ));

    Ok(response.json(VisitResponse {
        referral_code,
        recorded: !already_tracked,
    }))
}

/// POST /api/track/click
/// Records an app-store link click for a referral code. Only well-formed
/// clicks count against the rate limits.
pub async fn track_click(
    req: HttpRequest,
    config: web::Data<Config>,
    limiter: web::Data<RateLimitService>,
    recorder: web::Data<dyn ReferralRecorder>,
    body: web::Json<TrackClickRequest>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let (referral_code, platform) = match (body.referral_code, body.platform) {
        (Some(code), Some(platform)) => (code, platform),
        _ => return Err(AppError::Validation("Missing required fields".to_string())),
    };

    if !is_valid_referral_code(&referral_code) {
        return Err(AppError::Validation(
            "Invalid referral code format".to_string(),
        ));
    }

    let platform = Platform::parse(&platform)
        .ok_or_else(|| AppError::Validation("Invalid platform".to_string()))?;

    let rate_cookie = match admit(&req, &config, &limiter).await {
        Ok(cookie) => cookie,
        Err(rejection) => return Ok(rejection),
    };

    recorder.record_click(&referral_code, platform).await?;

    Ok(HttpResponse::Ok()
        .cookie(rate_cookie)
        .json(ClickResponse { message: "Tracked" }))
}

/// Configures the tracking routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/track")
            .route("/visit", web::get().to(track_visit))
            .route("/click", web::post().to(track_click)),
    );
}
