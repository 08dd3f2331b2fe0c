use actix_web::{web, HttpResponse};
use log::Level;
use serde::Deserialize;

use crate::auth::AdminAuth;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::is_valid_referral_code;
use crate::qr::QrCache;
use crate::reporting::RecentErrors;
use crate::routes::qr::SizeQuery;
use crate::services::ReferralRecorder;

/// Defaults for the referral dashboard lists
const DEFAULT_TOP_LIMIT: usize = 20;
const DEFAULT_RECENT_LIMIT: usize = 50;

/// Upper bound for any list limit
const MAX_LIST_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct PruneQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ReferralsQuery {
    pub top_limit: Option<usize>,
    pub recent_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorsQuery {
    pub level: Option<String>,
    pub limit: Option<usize>,
}

fn list_limit(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).min(MAX_LIST_LIMIT)
}

/// GET /api/admin/qr-cache - Cache statistics
pub async fn cache_stats(
    _admin: AdminAuth,
    cache: web::Data<QrCache>,
) -> AppResult<HttpResponse> {
    let stats = cache
        .stats()
        .await
        .map_err(|e| AppError::Storage(format!("Could not list QR cache: {}", e)))?;
    Ok(HttpResponse::Ok().json(stats))
}

/// DELETE /api/admin/qr-cache - Remove every cached image
pub async fn clear_cache(_admin: AdminAuth, cache: web::Data<QrCache>) -> HttpResponse {
    let deleted = cache.clear_all().await;
    HttpResponse::Ok().json(serde_json::json!({ "deleted": deleted }))
}

/// POST /api/admin/qr-cache/prune?days=N - Remove images older than N days
pub async fn prune_cache(
    _admin: AdminAuth,
    config: web::Data<Config>,
    cache: web::Data<QrCache>,
    query: web::Query<PruneQuery>,
) -> HttpResponse {
    let days = query.days.unwrap_or(config.qr.cache_ttl_days);
    let deleted = cache.prune(days).await;
    HttpResponse::Ok().json(serde_json::json!({
        "deleted": deleted,
        "older_than_days": days
    }))
}

/// DELETE /api/admin/qr-cache/{code}?size=N - Remove one cached image
pub async fn invalidate_entry(
    _admin: AdminAuth,
    config: web::Data<Config>,
    cache: web::Data<QrCache>,
    path: web::Path<String>,
    query: web::Query<SizeQuery>,
) -> AppResult<HttpResponse> {
    let referral_code = path.into_inner();
    if !is_valid_referral_code(&referral_code) {
        return Err(AppError::Validation(
            "Invalid referral code format".to_string(),
        ));
    }

    let size = config.qr.clamp_size(query.size);
    if !cache.invalidate(&referral_code, size).await {
        return Err(AppError::Storage(format!(
            "Could not delete cached QR for '{}' at {}px",
            referral_code, size
        )));
    }

    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/admin/referrals?top_limit=N&recent_limit=M - Dashboard summary
pub async fn referral_stats(
    _admin: AdminAuth,
    recorder: web::Data<dyn ReferralRecorder>,
    query: web::Query<ReferralsQuery>,
) -> AppResult<HttpResponse> {
    let summary = recorder
        .summary(
            list_limit(query.top_limit, DEFAULT_TOP_LIMIT),
            list_limit(query.recent_limit, DEFAULT_RECENT_LIMIT),
        )
        .await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// GET /api/admin/errors?level=L&limit=N - Recently reported problems, newest first
pub async fn list_errors(
    _admin: AdminAuth,
    errors: web::Data<RecentErrors>,
    query: web::Query<ErrorsQuery>,
) -> AppResult<HttpResponse> {
    let level = match query.level.as_deref().filter(|l| !l.is_empty()) {
        Some(raw) => Some(
            raw.parse::<Level>()
                .map_err(|_| AppError::Validation(format!("Unknown level '{}'", raw)))?,
        ),
        None => None,
    };

    let records = errors.query(list_limit(query.limit, DEFAULT_RECENT_LIMIT), level);
    Ok(HttpResponse::Ok().json(records))
}

/// GET /api/admin/errors/stats - Report counts by level and source
pub async fn error_stats(_admin: AdminAuth, errors: web::Data<RecentErrors>) -> HttpResponse {
    HttpResponse::Ok().json(errors.stats())
}

/// DELETE /api/admin/errors - Forget reported problems
pub async fn clear_errors(_admin: AdminAuth, errors: web::Data<RecentErrors>) -> HttpResponse {
    let cleared = errors.clear();
    HttpResponse::Ok().json(serde_json::json!({ "cleared": cleared }))
}

/// Configure admin routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/admin")
            .route("/qr-cache", web::get().to(cache_stats))
            .route("/qr-cache", web::delete().to(clear_cache))
            .route("/qr-cache/prune", web::post().to(prune_cache))
            .route("/qr-cache/{code}", web::delete().to(invalidate_entry))
            .route("/referrals", web::get().to(referral_stats))
            .route("/errors", web::get().to(list_errors))
            .route("/errors", web::delete().to(clear_errors))
            .route("/errors/stats", web::get().to(error_stats)),
    );
}
