//! Integration tests for the QR image endpoint

use actix_web::{test, App};
use image::GenericImageView;
use reftrak::qr::cache_key;
use serde_json::Value;
use std::sync::Arc;

use crate::common::{rate_limit_config, CountingEncoder, TestContext, UnavailableEncoder};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[actix_web::test]
async fn test_qr_is_png_and_cached_after_first_request() {
    let ctx = TestContext::new(rate_limit_config(50, 1000));
    let app = test::init_service(App::new().configure(|cfg| ctx.configure(cfg))).await;

    let req = test::TestRequest::get().uri("/api/qr/summer").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("Content-Type").unwrap(), "image/png");
    assert_eq!(resp.headers().get("X-Cache").unwrap(), "MISS");
    let first = test::read_body(resp).await;
    assert_eq!(&first[..8], &PNG_SIGNATURE);

    let req = test::TestRequest::get().uri("/api/qr/summer").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.headers().get("X-Cache").unwrap(), "HIT");
    let second = test::read_body(resp).await;
    assert_eq!(first, second);

    // Default size
    let entry = ctx.config.qr.cache_dir.join(cache_key("summer", 300));
    assert!(entry.is_file());
}

#[actix_web::test]
async fn test_qr_size_is_clamped_to_configured_bounds() {
    let ctx = TestContext::new(rate_limit_config(50, 1000));
    let app = test::init_service(App::new().configure(|cfg| ctx.configure(cfg))).await;

    for (requested, clamped) in [(20, 100), (250, 250), (5000, 500)] {
        let uri = format!("/api/qr/summer?size={}", requested);
        let req = test::TestRequest::get().uri(&uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let entry = ctx.config.qr.cache_dir.join(cache_key("summer", clamped));
        assert!(entry.is_file(), "no entry for size {}", clamped);
    }
}

#[actix_web::test]
async fn test_qr_image_scales_with_size() {
    let ctx = TestContext::new(rate_limit_config(50, 1000));
    let app = test::init_service(App::new().configure(|cfg| ctx.configure(cfg))).await;

    let mut widths = Vec::new();
    for size in [100, 500] {
        let uri = format!("/api/qr/summer?size={}", size);
        let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
        let body = test::read_body(resp).await;
        let decoded = image::load_from_memory(&body).unwrap();
        widths.push(decoded.dimensions().0);
    }

    assert!(widths[1] > widths[0]);
}

#[actix_web::test]
async fn test_qr_encodes_configured_base_url() {
    let encoder = Arc::new(CountingEncoder::default());
    let ctx = TestContext::build(rate_limit_config(50, 1000), encoder.clone(), |config| {
        config.qr.base_url = "https://example.com/app?src=qr".to_string();
    });
    let app = test::init_service(App::new().configure(|cfg| ctx.configure(cfg))).await;

    let req = test::TestRequest::get().uri("/api/qr/summer").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    assert_eq!(
        encoder.texts(),
        vec!["https://example.com/app?src=qr&r=summer".to_string()]
    );
}

#[actix_web::test]
async fn test_qr_invalid_code_is_rejected() {
    let ctx = TestContext::new(rate_limit_config(50, 1000));
    let app = test::init_service(App::new().configure(|cfg| ctx.configure(cfg))).await;

    let req = test::TestRequest::get().uri("/api/qr/not.valid").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "ValidationError");
}

#[actix_web::test]
async fn test_qr_without_encoder_is_service_unavailable() {
    let ctx = TestContext::build(
        rate_limit_config(50, 1000),
        Arc::new(UnavailableEncoder),
        |_| {},
    );
    let app = test::init_service(App::new().configure(|cfg| ctx.configure(cfg))).await;

    let req = test::TestRequest::get().uri("/api/qr/summer").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 503);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "QrUnavailable");
    assert_eq!(ctx.errors.recent().len(), 1);
}
