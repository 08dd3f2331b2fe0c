//! Integration tests for Health endpoints
//!
//! Tests the liveness and readiness health check endpoints.

use actix_web::{test, App};
use serde_json::Value;

use crate::common::{rate_limit_config, TestContext};

// =============================================================================
// Liveness Endpoint Tests
// =============================================================================

#[actix_web::test]
async fn test_liveness_returns_ok() {
    let ctx = TestContext::new(rate_limit_config(50, 1000));
    let app = test::init_service(App::new().configure(|cfg| ctx.configure(cfg))).await;

    let req = test::TestRequest::get().uri("/health").to_request();

    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
}

// =============================================================================
// Readiness Endpoint Tests
// =============================================================================

#[actix_web::test]
async fn test_readiness_creates_cache_directory() {
    let ctx = TestContext::new(rate_limit_config(50, 1000));
    assert!(!ctx.config.qr.cache_dir.exists());

    let app = test::init_service(App::new().configure(|cfg| ctx.configure(cfg))).await;
    let req = test::TestRequest::get().uri("/health/ready").to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["qr_cache"], "ok");
    assert!(ctx.config.qr.cache_dir.is_dir());
}

#[actix_web::test]
async fn test_readiness_fails_when_cache_directory_is_unusable() {
    let ctx = TestContext::new(rate_limit_config(50, 1000));
    // A regular file where the cache directory should be
    std::fs::write(ctx.dir.path().join("qr"), b"not a directory").unwrap();

    let app = test::init_service(App::new().configure(|cfg| ctx.configure(cfg))).await;
    let req = test::TestRequest::get().uri("/health/ready").to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 503);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["checks"]["qr_cache"], "error");
}
