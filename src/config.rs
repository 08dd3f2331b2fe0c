use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::is_valid_referral_code;
use crate::qr::DEFAULT_PRUNE_DAYS;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitConfig,
    pub qr: QrConfig,
    pub tracking: TrackingConfig,
    pub security: SecurityConfig,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Max tracking requests per visitor per window
    pub user_limit: u64,
    /// Max tracking requests for the whole site per window
    pub global_limit: u64,
    /// Window length, also the TTL of the global counter
    pub window: Duration,
    /// Reject instead of admit when the counter store is unavailable
    pub fail_closed: bool,
}

/// QR image cache configuration
#[derive(Debug, Clone)]
pub struct QrConfig {
    pub cache_dir: PathBuf,
    /// Destination encoded in every QR code (the referral code is appended)
    pub base_url: String,
    pub default_size: u32,
    pub min_size: u32,
    pub max_size: u32,
    /// Entries older than this are removed by pruning
    pub cache_ttl_days: u32,
    /// Housekeeping period; zero disables the background prune
    pub prune_interval: Duration,
}

/// Referral cookie configuration
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    pub cookie_days: u32,
    pub default_referral: String,
}

/// Security configuration for production deployments
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// True if server is behind a proxy that terminates SSL (nginx, Cloudflare, etc.)
    /// When true: cookies are marked Secure
    pub ssl_proxy: bool,
    /// Bearer token for the admin routes. Admin routes are locked when unset
    pub admin_token: Option<String>,
}

const DEFAULT_QR_CACHE_DIR: &str = "/tmp/reftrak/qr";
const DEFAULT_QR_BASE_URL: &str = "http://localhost:8080/download";

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            rate_limit: RateLimitConfig::from_env(),
            qr: QrConfig::from_env()?,
            tracking: TrackingConfig::from_env()?,
            security: SecurityConfig::from_env(),
        })
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            user_limit: 50,
            global_limit: 1000,
            window: Duration::from_secs(3600),
            fail_closed: false,
        }
    }
}

impl RateLimitConfig {
    /// Load rate limit configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            user_limit: env_or("RATE_LIMIT_USER", defaults.user_limit),
            global_limit: env_or("RATE_LIMIT_GLOBAL", defaults.global_limit),
            window: Duration::from_secs(
                env_or("RATE_LIMIT_WINDOW_SECS", defaults.window.as_secs()).max(1),
            ),
            fail_closed: env_flag("RATE_LIMIT_FAIL_CLOSED"),
        }
    }
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_QR_CACHE_DIR),
            base_url: DEFAULT_QR_BASE_URL.to_string(),
            default_size: 300,
            min_size: 100,
            max_size: 500,
            cache_ttl_days: DEFAULT_PRUNE_DAYS,
            prune_interval: Duration::from_secs(86_400),
        }
    }
}

impl QrConfig {
    /// Load QR cache configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let min_size = env_or("QR_MIN_SIZE", defaults.min_size);
        let max_size = env_or("QR_MAX_SIZE", defaults.max_size);

        if min_size > max_size {
            return Err(ConfigError::InvalidQrSizeBounds { min_size, max_size });
        }

        Ok(Self {
            cache_dir: env::var("QR_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            base_url: env::var("QR_BASE_URL").unwrap_or(defaults.base_url),
            default_size: env_or("QR_DEFAULT_SIZE", defaults.default_size)
                .clamp(min_size, max_size),
            min_size,
            max_size,
            cache_ttl_days: env_or("QR_CACHE_TTL_DAYS", defaults.cache_ttl_days),
            prune_interval: Duration::from_secs(env_or(
                "QR_PRUNE_INTERVAL_SECS",
                defaults.prune_interval.as_secs(),
            )),
        })
    }

    /// Clamps a requested size into the configured bounds, falling back to the default
    pub fn clamp_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_size)
            .clamp(self.min_size, self.max_size)
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            cookie_days: 30,
            default_referral: "direct".to_string(),
        }
    }
}

impl TrackingConfig {
    /// Load tracking cookie configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let default_referral = env::var("DEFAULT_REFERRAL").unwrap_or(defaults.default_referral);

        if !is_valid_referral_code(&default_referral) {
            return Err(ConfigError::InvalidDefaultReferral(default_referral));
        }

        Ok(Self {
            cookie_days: env_or("COOKIE_DAYS", defaults.cookie_days),
            default_referral,
        })
    }
}

impl SecurityConfig {
    /// Load security configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            ssl_proxy: env_flag("SSL_PROXY"),
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.trim().is_empty()),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidQrSizeBounds { min_size: u32, max_size: u32 },
    InvalidDefaultReferral(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "PORT must be a valid number"),
            ConfigError::InvalidQrSizeBounds { min_size, max_size } => write!(
                f,
                "QR_MIN_SIZE ({}) must not be greater than QR_MAX_SIZE ({})",
                min_size, max_size
            ),
            ConfigError::InvalidDefaultReferral(code) => write!(
                f,
                "DEFAULT_REFERRAL '{}' must match [a-zA-Z0-9_-]{{1,100}}",
                code
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
