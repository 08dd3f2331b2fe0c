use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};

use reftrak::bootstrap::Services;
use reftrak::config;
use reftrak::housekeeping;
use reftrak::routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Load configuration
    let config = config::Config::from_env().map_err(|e| {
        log::error!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!("Starting Reftrak server on {}:{}", config.host, config.port);

    // Build shared components (creates the QR cache directory)
    let services = Services::from_config(&config).await.map_err(|e| {
        log::error!("QR cache storage error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    // Periodic QR cache pruning
    if !config.qr.prune_interval.is_zero() {
        let cache = services.qr_cache.clone().into_inner();
        let period = config.qr.prune_interval;
        let days = config.qr.cache_ttl_days;
        actix_rt::spawn(housekeeping::run_prune_loop(cache, period, days));
    } else {
        log::info!("QR_PRUNE_INTERVAL_SECS is 0, background pruning disabled");
    }

    // Clone values for the closure
    let host = config.host.clone();
    let port = config.port;
    let config_data = web::Data::new(config);

    let server = HttpServer::new(move || {
        // Tracking calls come from the sites carrying the referral links
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::ACCEPT,
                actix_web::http::header::CONTENT_TYPE,
            ])
            .max_age(3600);

        App::new()
            // Share config and components with all handlers
            .app_data(config_data.clone())
            .configure(|cfg| services.register(cfg))
            // Middleware
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(routes::configure)
    })
    .bind((host.as_str(), port))?
    .shutdown_timeout(30)
    .run();

    // Spawn graceful shutdown handler
    let server_handle = server.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received, stopping server...");
        server_handle.stop(true).await;
    });

    server.await
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                log::error!("Failed to install Ctrl+C handler: {}", e);
                // Wait forever if signal handler fails
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
