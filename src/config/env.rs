//! Environment variable configuration module.
//!
//! Provides environment variable loading and the global `APP_CONFIG` instance.

use std::env;
use std::sync::Once;

use once_cell::sync::Lazy;

static INIT: Once = Once::new();

/// Default body size limit for both parsers (100kb).
pub const DEFAULT_BODY_LIMIT: usize = 100 * 1024;

/// Default maximum number of URL-encoded parameters.
pub const DEFAULT_PARAMETER_LIMIT: usize = 1000;

/// Initializes the environment by loading the .env file.
/// This is called automatically when `get_env` is first used.
fn init_env() {
    INIT.call_once(|| {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(".env file not found or error loading: {}", e);
        }
    });
}

/// Retrieves an environment variable by key.
///
/// If the variable is not set, returns the provided default value.
/// If no default is provided and the variable is not set, returns an empty string.
pub fn get_env(key: &str, default: Option<&str>) -> String {
    init_env();
    env::var(key).unwrap_or_else(|_| default.unwrap_or("").to_string())
}

/// Retrieves an environment variable as a parsed type.
pub fn get_env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    init_env();
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses a human readable byte size such as `100kb` or `1mb`.
///
/// Units are 1024-based and case-insensitive. A bare integer is a byte count.
pub fn parse_byte_size(value: &str) -> Option<usize> {
    let value = value.trim().to_ascii_lowercase();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: usize = digits.parse().ok()?;

    let multiplier = match unit.trim() {
        "" | "b" => 1,
        "kb" => 1024,
        "mb" => 1024 * 1024,
        "gb" => 1024 * 1024 * 1024,
        _ => return None,
    };

    amount.checked_mul(multiplier)
}

/// Retrieves a byte size from the environment, falling back on parse failure.
fn get_env_byte_size(key: &str, default: usize) -> usize {
    let raw = get_env(key, None);
    if raw.is_empty() {
        return default;
    }

    parse_byte_size(&raw).unwrap_or_else(|| {
        tracing::warn!(key, value = %raw, default, "Invalid byte size, using default");
        default
    })
}

/// Parses a boolean flag such as `true`, `0` or `yes`, case-insensitively.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Retrieves a boolean flag from the environment, falling back on parse failure.
fn get_env_flag(key: &str, default: bool) -> bool {
    let raw = get_env(key, None);
    if raw.is_empty() {
        return default;
    }

    parse_flag(&raw).unwrap_or_else(|| {
        tracing::warn!(key, value = %raw, default, "Invalid boolean flag, using default");
        default
    })
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Server settings
    pub server_port: String,

    // Environment
    pub is_production: bool,

    // Sentry settings
    pub sentry_dsn: String,
    pub sentry_traces_sample_rate: f32,

    // JSON body parser
    pub json_body_limit: usize,
    pub json_strict: bool,

    // URL-encoded body parser
    pub urlencoded_body_limit: usize,
    pub urlencoded_parameter_limit: usize,

    // Logging
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Creates a new `AppConfig` from environment variables.
    pub fn from_env() -> Self {
        let rust_env = get_env("RUST_ENV", Some("development"));
        let is_production = rust_env == "production" || rust_env == "prod";

        let log_format = if get_env("LOG_FORMAT", Some("pretty")).eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        };

        Self {
            server_port: get_env("SERVER_PORT", Some("3000")),

            is_production,

            sentry_dsn: get_env("SENTRY_DSN", None),
            sentry_traces_sample_rate: get_env_parsed("SENTRY_TRACES_SAMPLE_RATE", 0.1),

            json_body_limit: get_env_byte_size("JSON_BODY_LIMIT", DEFAULT_BODY_LIMIT),
            json_strict: get_env_flag("JSON_STRICT", true),

            urlencoded_body_limit: get_env_byte_size("URLENCODED_BODY_LIMIT", DEFAULT_BODY_LIMIT),
            urlencoded_parameter_limit: get_env_parsed(
                "URLENCODED_PARAMETER_LIMIT",
                DEFAULT_PARAMETER_LIMIT,
            ),

            log_format,
        }
    }
}

/// Global application configuration instance.
pub static APP_CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);
