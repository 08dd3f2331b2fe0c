use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use std::future::{ready, Ready};

use crate::config::Config;
use crate::error::AppError;

/// Extractor for the admin Bearer token (cache management, stats)
///
/// Usage in handlers:
/// ```ignore
/// async fn my_handler(_admin: AdminAuth) -> HttpResponse {
///     // only reached with a valid token
/// }
/// ```
pub struct AdminAuth;

impl FromRequest for AdminAuth {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authorize(req))
    }
}

fn authorize(req: &HttpRequest) -> Result<AdminAuth, AppError> {
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| AppError::Internal("Configuration not registered".to_string()))?;

    let expected = config.security.admin_token.as_deref().ok_or_else(|| {
        AppError::Unauthorized("Admin access is disabled (ADMIN_TOKEN not set)".to_string())
    })?;

    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Unauthorized(
            "Invalid Authorization header format, expected 'Bearer <token>'".to_string(),
        )
    })?;

    if !tokens_match(token.trim(), expected) {
        return Err(AppError::Unauthorized("Invalid Bearer token".to_string()));
    }

    Ok(AdminAuth)
}

/// Compares without short-circuiting on the first differing byte
fn tokens_match(given: &str, expected: &str) -> bool {
    let given = given.as_bytes();
    let expected = expected.as_bytes();

    if given.len() != expected.len() {
        return false;
    }

    given
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
