use actix_web::{http::StatusCode, web, HttpResponse};
use serde::Serialize;

use crate::qr::QrCache;

#[derive(Serialize)]
pub struct LivenessResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: &'static str,
    checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    qr_cache: &'static str,
}

/// Liveness check - is the process running?
/// Returns 200 if the server is alive.
pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(LivenessResponse { status: "ok" })
}

/// Readiness check - is the service ready to handle requests?
/// Returns 200 if the QR cache storage is usable, 503 otherwise.
pub async fn readiness(cache: web::Data<QrCache>) -> HttpResponse {
    let cache_ready = match cache.store().ensure_ready().await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("QR cache storage not ready: {}", e);
            false
        }
    };

    let (status, cache_status, http_status) = if cache_ready {
        ("ready", "ok", StatusCode::OK)
    } else {
        ("not_ready", "error", StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = ReadinessResponse {
        status,
        checks: ReadinessChecks {
            qr_cache: cache_status,
        },
    };

    HttpResponse::build(http_status).json(response)
}

/// Configures the health routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/health")
            .route("", web::get().to(liveness))
            .route("/ready", web::get().to(readiness)),
    );
}
