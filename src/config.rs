//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible
//! defaults for development. In production, configure via environment
//! variables or a `.env` file.
//!
//! # Security Configuration
//!
//! - `CORS_TRUSTED_ORIGINS`: space-separated list of trusted origins
//! - `TRUSTED_PROXIES`: CIDR ranges whose forwarded-IP headers are honored
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_RPS`: sustained requests per second per client (default: 2)
//! - `RATE_LIMIT_BURST`: token bucket capacity per client (default: 4)
//! - `RATE_LIMIT_ENABLED`: set to `false` to bypass the ledger entirely

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    /// Environment name reported by the healthcheck (development|staging|production)
    pub env: String,

    // =========================================================================
    // Database Configuration
    // =========================================================================
    /// PostgreSQL DSN
    pub db_dsn: String,

    /// Maximum connections held by the pool (default: 25)
    pub db_max_connections: u32,

    /// How long an idle connection is kept before being closed (default: 15m)
    pub db_idle_timeout: Duration,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Sustained refill rate per client, in requests per second (default: 2)
    pub rate_limit_rps: f64,

    /// Token bucket capacity per client (default: 4)
    pub rate_limit_burst: u32,

    /// Whether the client rate ledger is consulted at all (default: true)
    pub rate_limit_enabled: bool,

    // =========================================================================
    // SMTP Configuration
    // =========================================================================
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    /// Sender mailbox, e.g. `Marquee <no-reply@marquee.example>`
    pub smtp_sender: String,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Origins allowed by CORS negotiation (space separated in the env var)
    pub cors_trusted_origins: Vec<String>,

    /// Trusted proxy CIDR ranges. Forwarded-IP headers are only honored when
    /// the connection originates inside one of these networks; when empty,
    /// all sources are trusted (development mode).
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for the Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if any value fails to parse or validation
    /// fails (e.g. a zero refill rate with the limiter enabled).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8080)?,
            env: env::var("ENV").unwrap_or_else(|_| "development".to_string()),

            // Database
            db_dsn: env::var("DB_DSN").unwrap_or_default(),
            db_max_connections: Self::parse_env("DB_MAX_CONNECTIONS", 25)?,
            db_idle_timeout: Duration::from_secs(Self::parse_env(
                "DB_IDLE_TIMEOUT_SECS",
                15 * 60,
            )?),

            // Rate limiting
            rate_limit_rps: Self::parse_env("RATE_LIMIT_RPS", 2.0)?,
            rate_limit_burst: Self::parse_env("RATE_LIMIT_BURST", 4)?,
            rate_limit_enabled: Self::parse_env("RATE_LIMIT_ENABLED", true)?,

            // SMTP
            smtp_host: env::var("SMTP_HOST")
                .unwrap_or_else(|_| "sandbox.smtp.mailtrap.io".to_string()),
            smtp_port: Self::parse_env("SMTP_PORT", 2525)?,
            smtp_username: env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            smtp_sender: env::var("SMTP_SENDER")
                .unwrap_or_else(|_| "Marquee <no-reply@marquee.example>".to_string()),

            // Security
            cors_trusted_origins: Self::parse_list("CORS_TRUSTED_ORIGINS"),
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES"),

            // Observability
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    fn validate(&self) -> AppResult<()> {
        if self.rate_limit_enabled {
            if self.rate_limit_rps <= 0.0 {
                return Err(AppError::Config(
                    "RATE_LIMIT_RPS must be greater than 0 when rate limiting is enabled; \
                     set RATE_LIMIT_ENABLED=false to disable"
                        .to_string(),
                ));
            }
            if self.rate_limit_burst == 0 {
                return Err(AppError::Config(
                    "RATE_LIMIT_BURST must be greater than 0 when rate limiting is enabled"
                        .to_string(),
                ));
            }
        }

        if self.db_max_connections == 0 {
            return Err(AppError::Config(
                "DB_MAX_CONNECTIONS must be greater than 0".to_string(),
            ));
        }

        if self.smtp_sender.parse::<lettre::message::Mailbox>().is_err() {
            return Err(AppError::Config(format!(
                "SMTP_SENDER is not a valid mailbox: {}",
                self.smtp_sender
            )));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if the client rate ledger is consulted.
    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_enabled
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address, or `None` when disabled (port = 0).
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
                .map_err(|e| AppError::Config(format!("invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a space-separated list from an environment variable.
    fn parse_list(name: &str) -> Vec<String> {
        env::var(name)
            .unwrap_or_default()
            .split_whitespace()
            .map(|s| s.to_string())
            .collect()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            env: "development".to_string(),
            db_dsn: String::new(),
            db_max_connections: 25,
            db_idle_timeout: Duration::from_secs(15 * 60),
            rate_limit_rps: 2.0,
            rate_limit_burst: 4,
            rate_limit_enabled: true,
            smtp_host: "sandbox.smtp.mailtrap.io".to_string(),
            smtp_port: 2525,
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_sender: "Marquee <no-reply@marquee.example>".to_string(),
            cors_trusted_origins: vec![],
            trusted_proxies: vec![],
            metrics_port: 9090,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit_rps, 2.0);
        assert_eq!(config.rate_limit_burst, 4);
        assert!(config.rate_limit_enabled);
        assert_eq!(config.db_max_connections, 25);
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "localhost".to_string(),
            port: 4000,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "localhost:4000");
    }

    #[test]
    fn test_validate_zero_rps_with_limiter_enabled() {
        let config = Config {
            rate_limit_rps: 0.0,
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("RATE_LIMIT_RPS"));
    }

    #[test]
    fn test_validate_zero_rps_with_limiter_disabled() {
        let config = Config {
            rate_limit_rps: 0.0,
            rate_limit_enabled: false,
            ..Config::default()
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_sender() {
        let config = Config {
            smtp_sender: "not a mailbox".to_string(),
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metrics_disabled_with_zero_port() {
        let config = Config {
            metrics_port: 0,
            ..Config::default()
        };

        assert!(!config.metrics_enabled());
        assert!(config.metrics_addr().is_none());
    }
}
