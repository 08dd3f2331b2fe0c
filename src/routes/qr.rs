use actix_web::{http::header, web, HttpResponse};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::is_valid_referral_code;
use crate::qr::QrCache;

#[derive(Debug, Deserialize)]
pub struct SizeQuery {
    pub size: Option<u32>,
}

/// GET /api/qr/{code}?size=N
/// Serves the QR code for a referral link, rendering it on first request
pub async fn get_qr_image(
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
    let asset = cache
        .get_or_generate(&referral_code, &config.qr.base_url, size)
        .await?;

    Ok(HttpResponse::Ok()
        .content_type("image/png")
        .insert_header((header::CACHE_CONTROL, "public, max-age=86400"))
        .insert_header(("X-Cache", if asset.cache_hit { "HIT" } else { "MISS" }))
        .body(asset.bytes))
}

/// Configures the QR image routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/qr/{code}", web::get().to(get_qr_image));
}
