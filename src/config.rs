//! Runtime settings, read from the environment (a `.env` file is honoured).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_NAV_URL: &str = "https://encar-proxy.habsida.net/api/nav";
const DEFAULT_SEARCH_URL: &str = "https://api-encar.habsidev.com/api/catalog";
const DEFAULT_DETAIL_URL: &str = "https://api.encar.com/v1/readside/vehicle";
const DEFAULT_LISTING_URL: &str = "https://fem.encar.com/cars/detail";

/// Endpoints of the marketplace
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub nav_url: String,
    pub search_url: String,
    pub detail_url: String,
    /// Public page of a listing, the listing id is appended
    pub listing_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            nav_url: DEFAULT_NAV_URL.to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            detail_url: DEFAULT_DETAIL_URL.to_string(),
            listing_url: DEFAULT_LISTING_URL.to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            request_timeout: Duration::from_secs(20),
        }
    }
}

/// Tuning of the watch loops
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    pub call_timeout: Duration,
    pub max_concurrent_requests: usize,
    pub min_request_spacing: Duration,
    pub seen_retention: chrono::Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            call_timeout: Duration::from_secs(20),
            max_concurrent_requests: 4,
            min_request_spacing: Duration::from_millis(250),
            seen_retention: chrono::Duration::days(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bot_token: String,
    /// Always allowed to use the bot
    pub manager_id: Option<i64>,
    pub requests_file: PathBuf,
    pub access_file: PathBuf,
    pub marketplace: MarketplaceConfig,
    pub watch: WatchConfig,
    /// Start a watch task for every persisted search at startup
    pub rearm_on_start: bool,
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// Only `BOT_TOKEN` is required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }

        let bot_token = std::env::var("BOT_TOKEN").context("BOT_TOKEN not set")?;

        let manager_id = match std::env::var("MANAGER_ID") {
            Ok(v) => Some(v.trim().parse().context("MANAGER_ID must be a numeric id")?),
            Err(_) => None,
        };

        let request_timeout = Duration::from_secs(env_parse("REQUEST_TIMEOUT_SECS", 20)?);

        let marketplace = MarketplaceConfig {
            nav_url: env_or("NAV_URL", DEFAULT_NAV_URL),
            search_url: env_or("SEARCH_URL", DEFAULT_SEARCH_URL),
            detail_url: env_or("DETAIL_URL", DEFAULT_DETAIL_URL),
            listing_url: env_or("LISTING_URL", DEFAULT_LISTING_URL),
            user_agent: env_or("USER_AGENT", "Mozilla/5.0"),
            request_timeout,
        };

        let watch = WatchConfig {
            poll_interval: Duration::from_secs(env_parse("POLL_INTERVAL_SECS", 300)?),
            call_timeout: request_timeout,
            max_concurrent_requests: env_parse("MAX_CONCURRENT_REQUESTS", 4)?,
            min_request_spacing: Duration::from_millis(env_parse("MIN_REQUEST_SPACING_MS", 250)?),
            seen_retention: chrono::Duration::days(env_parse("SEEN_RETENTION_DAYS", 30)?),
        };

        Ok(Self {
            bot_token,
            manager_id,
            requests_file: PathBuf::from(env_or("REQUESTS_FILE", "requests.json")),
            access_file: PathBuf::from(env_or("ACCESS_FILE", "access.json")),
            marketplace,
            watch,
            rearm_on_start: parse_bool(&env_or("REARM_ON_START", "true")),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, v)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim(), "1" | "true" | "TRUE" | "True" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" 1 "));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn test_env_parse_default_and_invalid() {
        let v: u64 = env_parse("CAR_SCOUT_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(v, 42);

        std::env::set_var("CAR_SCOUT_TEST_BAD_NUMBER", "abc");
        let r: Result<u64> = env_parse("CAR_SCOUT_TEST_BAD_NUMBER", 1);
        assert!(r.is_err());
    }

    #[test]
    fn test_defaults() {
        let watch = WatchConfig::default();
        assert_eq!(watch.poll_interval, Duration::from_secs(300));
        assert_eq!(watch.seen_retention, chrono::Duration::days(30));
        assert!(MarketplaceConfig::default().search_url.starts_with("https://"));
    }
}
