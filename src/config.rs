/*
 * Responsibility
 * - Load settings from the environment (.env supported)
 * - Validate values; anything present but unparsable fails startup
 * - Produce the `DpopPolicy` handed to the validator
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::services::dpop::DpopPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    // Used to build the expected `htu` when running behind a proxy.
    pub public_base_url: Option<String>,
    // Honour X-Forwarded-Proto / X-Forwarded-Host; only behind a proxy that sets them.
    pub trust_forwarded_headers: bool,
    // In-memory stores when unset.
    pub valkey_url: Option<String>,

    pub dpop: DpopPolicy,
    // Purge interval of the in-memory replay and binding stores.
    pub sweep_interval: Duration,

    pub http_timeout: Duration,
    pub http_body_limit_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map here).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port: u16 = parse_or(get("PORT"), "PORT", 3000)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(get("APP_ENV"));

        let public_base_url = get("PUBLIC_BASE_URL");
        if let Some(base) = public_base_url.as_deref() {
            url::Url::parse(base).map_err(|_| ConfigError::Invalid("PUBLIC_BASE_URL"))?;
        }

        let trust_forwarded_headers = parse_bool_or(
            get("TRUST_FORWARDED_HEADERS"),
            "TRUST_FORWARDED_HEADERS",
            false,
        )?;

        let valkey_url = get("VALKEY_URL");

        let header_validity_ms: u64 = parse_or(
            get("DPOP_HEADER_VALIDITY_PERIOD_MS"),
            "DPOP_HEADER_VALIDITY_PERIOD_MS",
            60_000,
        )?;
        if header_validity_ms == 0 {
            return Err(ConfigError::Invalid("DPOP_HEADER_VALIDITY_PERIOD_MS"));
        }

        let clock_skew_ms: u64 = parse_or(get("DPOP_CLOCK_SKEW_MS"), "DPOP_CLOCK_SKEW_MS", 0)?;

        let skip_dpop_validation_in_revoke = parse_bool_or(
            get("DPOP_SKIP_VALIDATION_IN_REVOKE"),
            "DPOP_SKIP_VALIDATION_IN_REVOKE",
            true,
        )?;

        let allow_unbound_tokens = parse_bool_or(
            get("DPOP_ALLOW_UNBOUND_TOKENS"),
            "DPOP_ALLOW_UNBOUND_TOKENS",
            false,
        )?;

        let revocation_ttl_secs: u64 = parse_or(
            get("DPOP_REVOCATION_TTL_SECS"),
            "DPOP_REVOCATION_TTL_SECS",
            24 * 3600,
        )?;
        if revocation_ttl_secs == 0 {
            return Err(ConfigError::Invalid("DPOP_REVOCATION_TTL_SECS"));
        }

        let sweep_secs: u64 = parse_or(
            get("DPOP_REPLAY_SWEEP_INTERVAL_SECS"),
            "DPOP_REPLAY_SWEEP_INTERVAL_SECS",
            300,
        )?;
        if sweep_secs == 0 {
            return Err(ConfigError::Invalid("DPOP_REPLAY_SWEEP_INTERVAL_SECS"));
        }

        let http_timeout_secs: u64 = parse_or(get("HTTP_TIMEOUT_SECS"), "HTTP_TIMEOUT_SECS", 10)?;
        let http_body_limit_bytes: usize = parse_or(
            get("HTTP_BODY_LIMIT_BYTES"),
            "HTTP_BODY_LIMIT_BYTES",
            64 * 1024,
        )?;

        Ok(Self {
            addr,
            app_env,
            public_base_url,
            trust_forwarded_headers,
            valkey_url,
            dpop: DpopPolicy {
                header_validity_period: Duration::from_millis(header_validity_ms),
                clock_skew: Duration::from_millis(clock_skew_ms),
                skip_dpop_validation_in_revoke,
                allow_unbound_tokens,
                revocation_ttl: Duration::from_secs(revocation_ttl_secs),
            },
            sweep_interval: Duration::from_secs(sweep_secs),
            http_timeout: Duration::from_secs(http_timeout_secs),
            http_body_limit_bytes,
        })
    }
}

fn parse_or<T: FromStr>(
    value: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn parse_bool_or(
    value: Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match value.map(|v| v.to_ascii_lowercase()).as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes" | "on") => Ok(true),
        Some("false" | "0" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::Invalid(key)),
    }
}
