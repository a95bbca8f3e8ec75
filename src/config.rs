//! Runtime configuration from environment variables and command-line flags
//!
//! Environment is read first (after `.env` via dotenv), then `--flag value`
//! pairs on the command line override individual fields.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum CacheBackend {
    Redis,
    Memory,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub app_token: String,
    pub channel_id: String,
    /// Marker token counted as one gift, e.g. `:beer:`
    pub marker: String,
    pub max_per_day: i64,
    pub db_path: String,
    pub listen_addr: String,
    /// Bearer token for the authenticated API; `None` leaves it open.
    pub api_token: Option<String>,
    pub cache_backend: CacheBackend,
    pub redis_url: String,
    pub cache_sync_interval: Duration,
    pub probe_interval: Duration,
    pub shutdown_grace: Duration,
    pub slack_api_base: String,
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from the environment, then apply CLI overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let args: Vec<String> = env::args().skip(1).collect();
        let mut config = Self::from_env()?;
        config.apply_args(&args)?;
        config.validate()?;
        Ok(config)
    }

    /// Environment variables:
    /// - `BOT_TOKEN`, `APP_TOKEN`, `CHANNEL` (required)
    /// - `EMOJI` (default: `:beer:`)
    /// - `MAX_PER_DAY` (default: 10)
    /// - `DB_PATH` (default: beerbot.db)
    /// - `ADDR` (default: 0.0.0.0:8080)
    /// - `API_TOKEN` (default: unset)
    /// - `CACHE_BACKEND` redis | memory | none (default: redis)
    /// - `REDIS_ADDR` (default: redis://cache:6379)
    /// - `CACHE_SYNC_INTERVAL_SECS` (default: 300)
    /// - `PROBE_INTERVAL_SECS` (default: 30)
    /// - `SHUTDOWN_GRACE_SECS` (default: 5)
    /// - `SLACK_API_BASE` (default: https://slack.com/api)
    /// - `RUST_LOG` or `LOG_LEVEL` (default: info)
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = required("BOT_TOKEN")?;
        let app_token = required("APP_TOKEN")?;
        let channel_id = required("CHANNEL")?;

        let cache_str = env::var("CACHE_BACKEND").unwrap_or_else(|_| "redis".to_string());
        let cache_backend = parse_cache_backend(&cache_str).unwrap_or_else(|| {
            log::warn!("Invalid CACHE_BACKEND '{}', defaulting to redis", cache_str);
            CacheBackend::Redis
        });

        Ok(Self {
            bot_token,
            app_token,
            channel_id,
            marker: non_empty("EMOJI").unwrap_or_else(|| ":beer:".to_string()),
            max_per_day: parsed_or("MAX_PER_DAY", 10),
            db_path: non_empty("DB_PATH").unwrap_or_else(|| "beerbot.db".to_string()),
            listen_addr: normalize_listen_addr(
                &non_empty("ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            ),
            api_token: non_empty("API_TOKEN"),
            cache_backend,
            redis_url: normalize_redis_url(
                &non_empty("REDIS_ADDR").unwrap_or_else(|| "cache:6379".to_string()),
            ),
            cache_sync_interval: Duration::from_secs(parsed_or("CACHE_SYNC_INTERVAL_SECS", 300)),
            probe_interval: Duration::from_secs(parsed_or("PROBE_INTERVAL_SECS", 30)),
            shutdown_grace: Duration::from_secs(parsed_or("SHUTDOWN_GRACE_SECS", 5)),
            slack_api_base: non_empty("SLACK_API_BASE")
                .unwrap_or_else(|| "https://slack.com/api".to_string()),
            log_level: non_empty("RUST_LOG")
                .or_else(|| non_empty("LOG_LEVEL"))
                .unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Override fields from `--flag value` pairs. Unknown flags are ignored.
    pub fn apply_args(&mut self, args: &[String]) -> Result<(), ConfigError> {
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            if !flag.starts_with("--") {
                continue;
            }
            let value = match iter.next() {
                Some(value) => value.clone(),
                None => {
                    return Err(ConfigError::InvalidValue(format!("{} expects a value", flag)));
                }
            };
            match flag.as_str() {
                "--bot-token" => self.bot_token = value,
                "--app-token" => self.app_token = value,
                "--channel" => self.channel_id = value,
                "--emoji" => self.marker = value,
                "--db" => self.db_path = value,
                "--addr" => self.listen_addr = normalize_listen_addr(&value),
                "--api-token" => self.api_token = Some(value).filter(|v| !v.is_empty()),
                "--log-level" => self.log_level = value,
                "--max-per-day" => {
                    self.max_per_day = value.parse().map_err(|_| {
                        ConfigError::InvalidValue(format!("--max-per-day: '{}'", value))
                    })?;
                }
                other => log::warn!("Ignoring unknown flag {}", other),
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_per_day < 1 {
            return Err(ConfigError::InvalidValue(
                "MAX_PER_DAY must be at least 1".to_string(),
            ));
        }
        if self.marker.trim().is_empty() {
            return Err(ConfigError::InvalidValue("EMOJI must not be blank".to_string()));
        }
        Ok(())
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    non_empty(name).ok_or_else(|| ConfigError::MissingVariable(name.to_string()))
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Invalid {} '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn parse_cache_backend(raw: &str) -> Option<CacheBackend> {
    match raw.trim().to_lowercase().as_str() {
        "redis" => Some(CacheBackend::Redis),
        "memory" => Some(CacheBackend::Memory),
        "none" | "off" | "disabled" => Some(CacheBackend::Disabled),
        _ => None,
    }
}

/// `:8080` binds every interface.
fn normalize_listen_addr(raw: &str) -> String {
    if raw.starts_with(':') {
        format!("0.0.0.0{}", raw)
    } else {
        raw.to_string()
    }
}

fn normalize_redis_url(raw: &str) -> String {
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("redis://{}", raw)
    }
}
