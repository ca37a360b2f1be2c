// src/config.rs
//! Runtime configuration from environment variables (`.env` is loaded by the binary).
//!
//! Every variable is optional. A variable that is set but cannot be parsed is a fatal
//! `ConfigError`; the service refuses to start rather than run with a guessed value.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::gate::{GateConfig, DEFAULT_MAX_LIVE_STALE_SECONDS};
use crate::normalize::aliases::ENV_ALIASES_PATH;
use crate::normalize::AliasTable;
use crate::resolve::{ResolverConfig, DEFAULT_KICKOFF_TOLERANCE_MINUTES};

pub const ENV_MAX_LIVE_STALE_SECONDS: &str = "FOOTBALLAPI_MAX_LIVE_STALE_SECONDS";
pub const ENV_INSECURE_TLS: &str = "FOOTBALLAPI_INSECURE_TLS";
pub const ENV_TIMEOUT_SECONDS: &str = "FOOTBALLAPI_TIMEOUT_SECONDS";
pub const ENV_REQUEST_TIMEOUT_SECONDS: &str = "FOOTBALLAPI_REQUEST_TIMEOUT_SECONDS";
pub const ENV_CACHE_SECONDS: &str = "FOOTBALLAPI_CACHE_SECONDS";
pub const ENV_KICKOFF_TOLERANCE_MINUTES: &str = "FOOTBALLAPI_KICKOFF_TOLERANCE_MINUTES";
pub const ENV_FILTER_STAGE: &str = "FOOTBALLAPI_FILTER_STAGE";
pub const ENV_LOG_FORMAT: &str = "FOOTBALLAPI_LOG_FORMAT";

const DEFAULT_TIMEOUT_SECONDS: u64 = 20;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 25;
const DEFAULT_CACHE_SECONDS: u64 = 10;
/// Upper bound for fetch and request timeouts.
const MAX_TIMEOUT_SECONDS: u64 = 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("alias table {}: {reason}", path.display())]
    AliasTable { path: PathBuf, reason: String },
}

/// Where status/league filters are applied relative to the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterStage {
    /// Quality counters describe only the requested population.
    #[default]
    BeforeGate,
    /// Quality counters describe everything the sources returned.
    AfterGate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub max_live_stale_seconds: u64,
    pub insecure_tls: bool,
    pub source_timeout: Duration,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    pub kickoff_tolerance_minutes: i64,
    pub filter_stage: FilterStage,
    pub aliases_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_live_stale_seconds: DEFAULT_MAX_LIVE_STALE_SECONDS,
            insecure_tls: false,
            source_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_SECONDS),
            kickoff_tolerance_minutes: DEFAULT_KICKOFF_TOLERANCE_MINUTES,
            filter_stage: FilterStage::default(),
            aliases_path: None,
            log_format: LogFormat::default(),
        }
    }
}

/// Truthy flag values shared by env variables and query parameters.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| invalid(key, raw, e.to_string()))
}

fn parse_positive_secs(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    match parse_u64(key, raw)? {
        0 => Err(invalid(key, raw, "must be greater than zero")),
        n if n > MAX_TIMEOUT_SECONDS => Err(invalid(key, raw, "at most one hour")),
        n => Ok(Duration::from_secs(n)),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; tests pass a map instead of touching the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_MAX_LIVE_STALE_SECONDS) {
            cfg.max_live_stale_seconds = parse_u64(ENV_MAX_LIVE_STALE_SECONDS, &v)?;
        }
        if let Some(v) = get(ENV_INSECURE_TLS) {
            cfg.insecure_tls = parse_flag(&v)
                .ok_or_else(|| invalid(ENV_INSECURE_TLS, &v, "expected a boolean flag"))?;
        }
        if let Some(v) = get(ENV_TIMEOUT_SECONDS) {
            cfg.source_timeout = parse_positive_secs(ENV_TIMEOUT_SECONDS, &v)?;
        }
        if let Some(v) = get(ENV_REQUEST_TIMEOUT_SECONDS) {
            cfg.request_timeout = parse_positive_secs(ENV_REQUEST_TIMEOUT_SECONDS, &v)?;
        }
        if let Some(v) = get(ENV_CACHE_SECONDS) {
            cfg.cache_ttl = Duration::from_secs(parse_u64(ENV_CACHE_SECONDS, &v)?);
        }
        if let Some(v) = get(ENV_KICKOFF_TOLERANCE_MINUTES) {
            let minutes = parse_u64(ENV_KICKOFF_TOLERANCE_MINUTES, &v)?;
            cfg.kickoff_tolerance_minutes = i64::try_from(minutes)
                .ok()
                .filter(|m| *m <= 7 * 24 * 60)
                .ok_or_else(|| invalid(ENV_KICKOFF_TOLERANCE_MINUTES, &v, "at most one week"))?;
        }
        if let Some(v) = get(ENV_FILTER_STAGE) {
            cfg.filter_stage = match v.trim().to_ascii_lowercase().as_str() {
                "before_gate" | "before" => FilterStage::BeforeGate,
                "after_gate" | "after" => FilterStage::AfterGate,
                _ => return Err(invalid(ENV_FILTER_STAGE, &v, "expected before_gate or after_gate")),
            };
        }
        if let Some(v) = get(ENV_LOG_FORMAT) {
            cfg.log_format = match v.trim().to_ascii_lowercase().as_str() {
                "compact" | "text" => LogFormat::Compact,
                "json" => LogFormat::Json,
                _ => return Err(invalid(ENV_LOG_FORMAT, &v, "expected compact or json")),
            };
        }
        cfg.aliases_path = get(ENV_ALIASES_PATH).map(|v| PathBuf::from(v.trim()));

        Ok(cfg)
    }

    /// Gate settings before per-request overrides.
    pub fn gate_defaults(&self) -> GateConfig {
        GateConfig {
            max_live_stale_seconds: self.max_live_stale_seconds,
            ..GateConfig::default()
        }
    }

    pub fn resolver(&self) -> ResolverConfig {
        ResolverConfig {
            kickoff_tolerance: chrono::Duration::minutes(self.kickoff_tolerance_minutes),
        }
    }

    pub fn load_aliases(&self) -> Result<AliasTable, ConfigError> {
        AliasTable::load_with_override(self.aliases_path.clone())
    }
}
