// src/config/bot.rs
use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
pub const MIN_POLL_INTERVAL_SECS: u64 = 60;
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;

pub const DEFAULT_SOCIAL_ACCOUNTS: &[&str] = &["cryptounfolded", "zoomerfied", "WatcherGuru"];

/// Mirror hosts for the social feed, probed in this order.
pub const DEFAULT_SOCIAL_MIRRORS: &[&str] = &[
    "https://nitter.poast.org",
    "https://nitter.privacydev.net",
    "https://nitter.net",
    "https://nitter.cz",
    "https://nitter.unixfox.eu",
    "https://nitter.1d4.us",
    "https://nitter.kavin.rocks",
    "https://nitter.it",
    "https://nitter.domain.glass",
    "https://nitter.moomoo.me",
];

/// Clamp a requested poll interval into the supported [60, 3600] second range.
pub fn clamp_poll_interval(secs: u64) -> u64 {
    secs.clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS)
}

/// Everything the composition root needs to build a running bot.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub database_path: PathBuf,
    pub anthropic_api_key: String,
    pub anthropic_model: Option<String>,
    pub discord_webhook_url: String,
    pub cryptopanic_api_key: Option<String>,
    /// Owning identity for `bot_status` (lower-cased).
    pub owner_key: String,
    pub poll_interval_secs: u64,
    pub limit_per_source: usize,
    pub bot_name: String,
    pub filter_by_assets: bool,
    pub social_accounts: Vec<String>,
    pub social_mirrors: Vec<String>,
    /// 0 disables the daily cleanup.
    pub retention_days: u32,
    /// Post startup/shutdown embeds on lifecycle transitions.
    pub announce_lifecycle: bool,
    /// Start automatically at boot when the stored status says enabled.
    pub autostart: bool,
}

impl BotConfig {
    /// Read configuration from the process environment.
    /// Call `dotenvy::dotenv()` beforehand to pick up a local `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key → value lookup (env, map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let anthropic_api_key =
            get("ANTHROPIC_API_KEY").ok_or(ConfigError::Missing("ANTHROPIC_API_KEY"))?;

        let discord_webhook_url =
            get("DISCORD_WEBHOOK_URL").ok_or(ConfigError::Missing("DISCORD_WEBHOOK_URL"))?;
        validate_webhook_url(&discord_webhook_url)?;

        let poll_interval_secs = match get("SENTIMENT_POLL_INTERVAL") {
            Some(v) => clamp_poll_interval(parse_num("SENTIMENT_POLL_INTERVAL", &v)?),
            None => DEFAULT_POLL_INTERVAL_SECS,
        };

        let limit_per_source = match get("SENTIMENT_LIMIT_PER_SOURCE") {
            Some(v) => parse_num::<usize>("SENTIMENT_LIMIT_PER_SOURCE", &v)?.max(1),
            None => 20,
        };

        let retention_days = match get("SENTIMENT_RETENTION_DAYS") {
            Some(v) => parse_num("SENTIMENT_RETENTION_DAYS", &v)?,
            None => 30,
        };

        // Blank-but-present disables the social feed; absent falls back to defaults.
        let social_accounts = match lookup("SENTIMENT_SOCIAL_ACCOUNTS") {
            Some(v) => split_list(&v),
            None => DEFAULT_SOCIAL_ACCOUNTS.iter().map(|s| s.to_string()).collect(),
        };
        let social_mirrors = match get("SENTIMENT_SOCIAL_MIRRORS") {
            Some(v) => split_list(&v),
            None => DEFAULT_SOCIAL_MIRRORS.iter().map(|s| s.to_string()).collect(),
        };

        let owner_key = get("SENTIMENT_OWNER_KEY")
            .or_else(|| get("WALLET_ADDRESS"))
            .unwrap_or_else(|| "default".to_string())
            .to_lowercase();

        Ok(Self {
            database_path: get("SENTIMENT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/sentiment.db")),
            anthropic_api_key,
            anthropic_model: get("ANTHROPIC_MODEL"),
            discord_webhook_url,
            cryptopanic_api_key: get("CRYPTOPANIC_API_KEY"),
            owner_key,
            poll_interval_secs,
            limit_per_source,
            bot_name: get("SENTIMENT_BOT_NAME").unwrap_or_else(|| "Sentiment Bot".to_string()),
            filter_by_assets: parse_flag("SENTIMENT_FILTER_BY_ASSETS", get("SENTIMENT_FILTER_BY_ASSETS"), true)?,
            social_accounts,
            social_mirrors,
            retention_days,
            announce_lifecycle: parse_flag("SENTIMENT_ANNOUNCE", get("SENTIMENT_ANNOUNCE"), true)?,
            autostart: parse_flag("SENTIMENT_AUTOSTART", get("SENTIMENT_AUTOSTART"), true)?,
        })
    }
}

/// Webhook must be an absolute http(s) URL.
pub fn validate_webhook_url(url: &str) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::Invalid {
        var: "DISCORD_WEBHOOK_URL",
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            var: "DISCORD_WEBHOOK_URL",
            reason: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    Ok(())
}

fn parse_num<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

fn parse_flag(var: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(v) = raw else {
        return Ok(default);
    };
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            var,
            reason: format!("expected boolean, got {other:?}"),
        }),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
