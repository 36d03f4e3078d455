use serde::Deserialize;
use std::env;

/// Base URL of the remote activity log. Not configurable from the environment.
pub const DEFAULT_API_BASE: &str = "https://api.torn.com";

pub const MIN_HISTORY_YEARS: u32 = 1;
pub const MAX_HISTORY_YEARS: u32 = 5;
pub const MIN_CACHE_DAYS: u32 = 1;
pub const MAX_CACHE_DAYS: u32 = 60;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tracker: TrackerConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub local_path: Option<String>,
}

/// User-facing tracking options.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Opaque credential passed through to the remote log.
    pub api_key: Option<String>,
    /// Years of history swept per refresh, 1..=5.
    pub history_years: u32,
    /// Age in days after which cached stats are stale, 1..=60.
    pub cache_days: u32,
    pub auto_refresh: bool,
    /// Match records by display name when no id is present. Over-matches
    /// common name fragments; leave on only when recall matters more.
    pub name_fallback: bool,
    pub recheck_delay_secs: u64,
}

/// Remote log pagination settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    pub base_url: String,
    pub chunk_secs: i64,
    pub max_chunks: usize,
    pub inter_chunk_delay_ms: u64,
    pub window_skew_secs: i64,
    pub request_timeout_secs: u64,
    pub comment: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            chunk_secs: 90 * 24 * 3600,
            max_chunks: 24,
            inter_chunk_delay_ms: 200,
            window_skew_secs: 300,
            request_timeout_secs: 30,
            comment: format!("Trader Log v{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            history_years: 3,
            cache_days: 7,
            auto_refresh: true,
            name_fallback: true,
            recheck_delay_secs: 35,
        }
    }
}

impl TrackerConfig {
    /// Clamp numeric options into their supported ranges.
    pub fn normalized(mut self) -> Self {
        self.history_years = clamp_history_years(self.history_years);
        self.cache_days = self.cache_days.clamp(MIN_CACHE_DAYS, MAX_CACHE_DAYS);
        self
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

pub fn clamp_history_years(years: u32) -> u32 {
    years.clamp(MIN_HISTORY_YEARS, MAX_HISTORY_YEARS)
}

impl Default for Config {
    fn default() -> Self {
        let fetch_defaults = FetchConfig::default();
        let tracker_defaults = TrackerConfig::default();

        Self {
            server: ServerConfig {
                host: env::var("TRADELOG_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: parse_env_or("TRADELOG_PORT", 3080),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:tradelog.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
                local_path: env::var("DATABASE_LOCAL_PATH").ok(),
            },
            tracker: TrackerConfig {
                api_key: non_empty_env("TRADELOG_API_KEY"),
                history_years: parse_env_or(
                    "TRADELOG_HISTORY_YEARS",
                    tracker_defaults.history_years,
                ),
                cache_days: parse_env_or("TRADELOG_CACHE_DAYS", tracker_defaults.cache_days),
                auto_refresh: parse_env_or("TRADELOG_AUTO_REFRESH", tracker_defaults.auto_refresh),
                name_fallback: parse_env_or(
                    "TRADELOG_NAME_FALLBACK",
                    tracker_defaults.name_fallback,
                ),
                recheck_delay_secs: parse_env_or(
                    "TRADELOG_RECHECK_DELAY_SECS",
                    tracker_defaults.recheck_delay_secs,
                ),
            }
            .normalized(),
            fetch: FetchConfig {
                inter_chunk_delay_ms: parse_env_or(
                    "TRADELOG_CHUNK_DELAY_MS",
                    fetch_defaults.inter_chunk_delay_ms,
                ),
                request_timeout_secs: parse_env_or(
                    "TRADELOG_REQUEST_TIMEOUT",
                    fetch_defaults.request_timeout_secs,
                ),
                ..fetch_defaults
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}
