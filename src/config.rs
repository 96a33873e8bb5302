// config.rs - Bot Configuration Module
// Loads botconfig.txt (KEY=VALUE) into the process environment, then builds a typed,
// fully validated BotConfig from the environment. Everything is checked once at
// startup so a bad deployment fails before connecting to Discord.
//
// Used by: main.rs (startup), workflow.rs / sftp.rs / fetch.rs (via the built config)

use std::env;
use std::fs;
use std::time::Duration;

use log::{debug, info};
use serenity::model::id::GuildId;
use thiserror::Error;

const CONFIG_PATHS: [&str; 4] = [
    "botconfig.txt",
    "../botconfig.txt",
    "../../botconfig.txt",
    "src/botconfig.txt",
];

const TOKEN_PLACEHOLDER: &str = "YOUR_BOT_TOKEN_HERE";
const DEFAULT_SFTP_PORT: u16 = 22;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SFTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("DISCORD_TOKEN is set to the placeholder value; replace it with your bot token")]
    PlaceholderToken,
    #[error("{key} must be a valid number (got `{value}`)")]
    NotANumber { key: &'static str, value: String },
    #[error("{0} must be at least 1 second")]
    ZeroTimeout(&'static str),
}

/// Where uploads go and how to log in
#[derive(Debug, Clone)]
pub struct SftpTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub remote_path: String,
    /// Bounds the TCP connect and every blocking libssh2 call
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub guild_id: GuildId,
    pub sftp: SftpTarget,
    /// Public asset host, without trailing slash (e.g. `https://assets.ledfx.app`)
    pub assets_base_url: String,
    pub http_timeout: Duration,
}

impl BotConfig {
    /// Build from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as missing
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let discord_token = required("DISCORD_TOKEN")?;
        if discord_token == TOKEN_PLACEHOLDER {
            return Err(ConfigError::PlaceholderToken);
        }

        let guild_id = parse_number::<u64>("LEDFX_SERVER_GUILD", required("LEDFX_SERVER_GUILD")?)?;

        let port = match get("SFTP_PORT") {
            Some(value) => parse_number::<u16>("SFTP_PORT", value)?,
            None => DEFAULT_SFTP_PORT,
        };

        let http_timeout = parse_timeout("HTTP_TIMEOUT", get("HTTP_TIMEOUT"), DEFAULT_HTTP_TIMEOUT_SECS)?;
        let sftp_timeout = parse_timeout("SFTP_TIMEOUT", get("SFTP_TIMEOUT"), DEFAULT_SFTP_TIMEOUT_SECS)?;

        let sftp = SftpTarget {
            host: required("SFTP_HOST")?,
            port,
            username: required("SFTP_USERNAME")?,
            password: required("SFTP_PASSWORD")?,
            remote_path: required("SFTP_PATH")?,
            timeout: sftp_timeout,
        };

        let assets_base_url = required("ASSETS_BASE_URL")?.trim_end_matches('/').to_string();

        Ok(BotConfig {
            discord_token,
            guild_id: GuildId(guild_id),
            sftp,
            assets_base_url,
            http_timeout,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse::<T>()
        .map_err(|_| ConfigError::NotANumber { key, value })
}

/// Whole seconds, defaulted when unset; zero would disable the timeout entirely
fn parse_timeout(key: &'static str, value: Option<String>, default_secs: u64) -> Result<Duration, ConfigError> {
    let secs = match value {
        Some(value) => parse_number::<u64>(key, value)?,
        None => default_secs,
    };
    if secs == 0 {
        return Err(ConfigError::ZeroTimeout(key));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse KEY=VALUE lines, skipping blanks and `#` comments
pub fn parse_config_lines(content: &str) -> Vec<(String, String)> {
    // Remove BOM if present
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Export botconfig.txt into the environment, trying the usual locations in order.
/// Variables already present in the environment win over the file.
/// Returns the path that was loaded, or None when no file exists (env-only deployment).
pub fn load_bot_config() -> Option<&'static str> {
    for config_path in CONFIG_PATHS {
        let content = match fs::read_to_string(config_path) {
            Ok(content) => content,
            Err(_) => continue,
        };

        for (key, value) in parse_config_lines(&content) {
            if env::var_os(&key).is_some() {
                debug!("[CONFIG] {} already set in environment, ignoring file value", key);
                continue;
            }
            env::set_var(&key, &value);
        }

        info!("✅ [CONFIG] Configuration loaded from {}", config_path);
        return Some(config_path);
    }

    info!("[CONFIG] No botconfig.txt found (., .., ../.., src/); using environment only");
    None
}
