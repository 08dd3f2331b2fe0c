pub mod admin;
pub mod health;
pub mod qr;
pub mod track;

use actix_web::web;

/// Registers every route of the service
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::configure)
        .configure(track::configure)
        .configure(qr::configure)
        .configure(admin::configure);
}
