//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Security Configuration
//!
//! - `SESSION_SECRET`: Shared HS256 secret used to verify session tokens (required)
//! - `SESSION_COOKIE_NAMES`: Cookie names carrying the session token, checked in order
//! - `TRUSTED_PROXIES`: CIDR ranges whose forwarding headers are believed
//! - `CORS_ALLOWED_ORIGINS`: Comma-separated list of allowed origins (default: `*` for dev)
//!
//! # Rate Store
//!
//! - `RATE_STORE_URL`: Redis URL for the shared request counters. When unset the
//!   counters live in process memory, which is only correct for a single instance.
//! - `RATE_STORE_TOKEN`: Access token, sent as the connection password
//! - `RATE_LIMIT_ENABLED`: Set to `false` to disable the rate limiter
//!
//! The window length and request ceiling are compiled in
//! ([`RATE_LIMIT_WINDOW_SECS`], [`RATE_LIMIT_MAX_REQUESTS`]).

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::retry::RetryPolicy;

/// Fixed window length for the request counter, in seconds.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Maximum requests a single client may make per window.
pub const RATE_LIMIT_MAX_REQUESTS: u32 = 60;

/// Minimum accepted length of the session secret in bytes.
pub const MIN_SESSION_SECRET_LEN: usize = 32;

const DEFAULT_SESSION_COOKIE_NAMES: &str = "session-token,__Secure-session-token";

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-field lines
    Pretty,
    /// One JSON object per event
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty or json)")),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    // =========================================================================
    // Session Configuration
    // =========================================================================
    /// Shared secret the identity provider signs session tokens with
    pub session_secret: String,

    /// Cookie names that may carry the session token, in lookup order.
    /// Default: ["session-token", "__Secure-session-token"]
    pub session_cookie_names: Vec<String>,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Whether the fixed-window rate limiter is applied to the API namespace
    pub rate_limit_enabled: bool,

    /// Redis connection URL for the counter store (None = in-memory store)
    pub rate_store_url: Option<String>,

    /// Access token for the counter store, applied as the connection password
    pub rate_store_token: Option<String>,

    /// Trusted proxy CIDR ranges for IP spoofing mitigation.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    /// Default: Empty (forwarding headers are believed from any peer)
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Rate Store Connection Resilience
    // =========================================================================
    /// Attempts made to reach the counter store at startup (default: 5)
    pub store_connect_max_attempts: u32,

    /// Base delay between startup connection attempts (exponential backoff applies)
    pub store_connect_base_delay: Duration,

    /// Maximum delay between startup connection attempts
    pub store_connect_max_delay: Duration,

    /// Interval for the background store health ping
    pub store_health_check_interval: Duration,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// Comma-separated list of allowed CORS origins
    /// Use "*" to allow all origins (not recommended for production)
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Log output format (default: pretty)
    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any required configuration is missing
    /// or invalid (e.g., no `SESSION_SECRET`, non-numeric PORT value).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,

            // Session
            session_secret: env::var("SESSION_SECRET")
                .ok()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AppError::ConfigError("SESSION_SECRET must be set".to_string()))?,
            session_cookie_names: Self::parse_list(
                "SESSION_COOKIE_NAMES",
                DEFAULT_SESSION_COOKIE_NAMES,
            ),

            // Rate limiting
            rate_limit_enabled: Self::parse_env("RATE_LIMIT_ENABLED", true)?,
            rate_store_url: env::var("RATE_STORE_URL").ok().filter(|s| !s.is_empty()),
            rate_store_token: env::var("RATE_STORE_TOKEN").ok().filter(|s| !s.is_empty()),
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES", ""),

            // Store resilience
            store_connect_max_attempts: Self::parse_env("STORE_CONNECT_MAX_ATTEMPTS", 5)?,
            store_connect_base_delay: Duration::from_millis(Self::parse_env(
                "STORE_CONNECT_BASE_DELAY_MS",
                200,
            )?),
            store_connect_max_delay: Duration::from_millis(Self::parse_env(
                "STORE_CONNECT_MAX_DELAY_MS",
                5000,
            )?),
            store_health_check_interval: Duration::from_secs(Self::parse_env(
                "STORE_HEALTH_CHECK_INTERVAL_SECS",
                30,
            )?),

            // HTTP
            cors_allowed_origins: Self::parse_list("CORS_ALLOWED_ORIGINS", "*"),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format: Self::parse_env("LOG_FORMAT", LogFormat::Pretty)?,
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(AppError::ConfigError(format!(
                "SESSION_SECRET must be at least {MIN_SESSION_SECRET_LEN} bytes"
            )));
        }

        if self.session_cookie_names.is_empty() {
            return Err(AppError::ConfigError(
                "SESSION_COOKIE_NAMES must name at least one cookie".to_string(),
            ));
        }

        if self.store_connect_max_attempts == 0 {
            return Err(AppError::ConfigError(
                "STORE_CONNECT_MAX_ATTEMPTS must be greater than 0".to_string(),
            ));
        }

        if self.store_connect_base_delay > self.store_connect_max_delay {
            return Err(AppError::ConfigError(format!(
                "STORE_CONNECT_BASE_DELAY_MS ({:?}) must be <= STORE_CONNECT_MAX_DELAY_MS ({:?})",
                self.store_connect_base_delay, self.store_connect_max_delay
            )));
        }

        if self.store_health_check_interval.is_zero() {
            return Err(AppError::ConfigError(
                "STORE_HEALTH_CHECK_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check whether counters go to an external store rather than process memory.
    pub fn uses_external_store(&self) -> bool {
        self.rate_store_url.is_some()
    }

    /// Check if trusted proxy validation is enabled.
    pub fn proxy_validation_enabled(&self) -> bool {
        !self.trusted_proxies.is_empty()
    }

    /// Backoff policy for establishing the store connection at startup.
    pub fn store_connect_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.store_connect_max_attempts,
            self.store_connect_base_delay,
            self.store_connect_max_delay,
        )
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list, dropping blank entries.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        split_list(&env::var(name).unwrap_or_else(|_| default.to_string()))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default configuration for testing and development.
///
/// The secret is a fixed development value. Production deployments should use
/// `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            // Session
            session_secret: "development-only-session-secret-change-me".to_string(),
            session_cookie_names: split_list(DEFAULT_SESSION_COOKIE_NAMES),
            // Rate limiting
            rate_limit_enabled: true,
            rate_store_url: None,
            rate_store_token: None,
            trusted_proxies: vec![],
            // Store resilience
            store_connect_max_attempts: 5,
            store_connect_base_delay: Duration::from_millis(200),
            store_connect_max_delay: Duration::from_secs(5),
            store_health_check_interval: Duration::from_secs(30),
            // HTTP
            cors_allowed_origins: vec!["*".to_string()],
            // Observability
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: 9090,
        }
    }
}
