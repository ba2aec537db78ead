//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.bosun/config.json`) and environment.
//! Every field has a default, so a missing file or an empty `{}` yields a working bot.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Bot identity and dispatch settings.
    #[serde(default)]
    pub bot: BotConfig,

    /// Bundled handler settings.
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Chat service connection settings.
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Bot name, handler timeout and channel sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// Name used by `!who` (default "Bosun"). Overridden by BOSUN_BOT_NAME env.
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Seconds a single handler call may take before its reply is dropped (default 30). 0 disables the limit.
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,

    /// Capacity of the inbound and outbound message channels (default 64).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_bot_name() -> String {
    "Bosun".to_string()
}

fn default_handler_timeout_secs() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            handler_timeout_secs: default_handler_timeout_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl BotConfig {
    /// Handler timeout as a duration; None when disabled.
    pub fn handler_timeout(&self) -> Option<Duration> {
        (self.handler_timeout_secs > 0).then(|| Duration::from_secs(self.handler_timeout_secs))
    }
}

/// Bundled handler settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginsConfig {
    /// Handler names to skip (case-insensitive), e.g. ["Cats"].
    #[serde(default)]
    pub disabled: Vec<String>,

    #[serde(default)]
    pub principles: PrinciplesConfig,

    #[serde(default)]
    pub cats: CatsConfig,
}

/// Where the principles document lives on GitHub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinciplesConfig {
    #[serde(default = "default_principles_owner")]
    pub owner: String,
    #[serde(default = "default_principles_repo")]
    pub repo: String,
    #[serde(default = "default_principles_path")]
    pub path: String,
    /// API token for private repos or higher rate limits. Overridden by GITHUB_TOKEN env.
    pub token: Option<String>,
}

fn default_principles_owner() -> String {
    "handwritingio".to_string()
}

fn default_principles_repo() -> String {
    "principles".to_string()
}

fn default_principles_path() -> String {
    "EngineeringPrinciples.md".to_string()
}

impl Default for PrinciplesConfig {
    fn default() -> Self {
        Self {
            owner: default_principles_owner(),
            repo: default_principles_repo(),
            path: default_principles_path(),
            token: None,
        }
    }
}

/// Cat API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatsConfig {
    /// Returns `{"fact": "..."}`.
    #[serde(default = "default_cat_fact_url")]
    pub fact_url: String,
    /// Returns `[{"url": "..."}]`; `mime_types=jpg|gif` is appended.
    #[serde(default = "default_cat_image_url")]
    pub image_url: String,
}

fn default_cat_fact_url() -> String {
    "https://catfact.ninja/fact".to_string()
}

fn default_cat_image_url() -> String {
    "https://api.thecatapi.com/v1/images/search".to_string()
}

impl Default for CatsConfig {
    fn default() -> Self {
        Self {
            fact_url: default_cat_fact_url(),
            image_url: default_cat_image_url(),
        }
    }
}

/// Chat service connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub slack: SlackChannelConfig,
}

/// Slack RTM connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackChannelConfig {
    /// Bot user token. Overridden by SLACK_TOKEN env.
    pub token: Option<String>,
    /// Web API base (default "https://slack.com/api").
    #[serde(default = "default_slack_api_url")]
    pub api_url: String,
}

fn default_slack_api_url() -> String {
    "https://slack.com/api".to_string()
}

impl Default for SlackChannelConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_slack_api_url(),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the bot name: env BOSUN_BOT_NAME overrides config.
pub fn resolve_bot_name(config: &Config) -> String {
    non_empty_env("BOSUN_BOT_NAME").unwrap_or_else(|| {
        let name = config.bot.name.trim();
        if name.is_empty() {
            default_bot_name()
        } else {
            name.to_string()
        }
    })
}

/// Resolve the GitHub token: env GITHUB_TOKEN overrides config.
pub fn resolve_github_token(config: &Config) -> Option<String> {
    non_empty_env("GITHUB_TOKEN").or_else(|| {
        config
            .plugins
            .principles
            .token
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the Slack token: env SLACK_TOKEN overrides config.
pub fn resolve_slack_token(config: &Config) -> Option<String> {
    non_empty_env("SLACK_TOKEN").or_else(|| {
        config
            .channels
            .slack
            .token
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Where `bosun run` looks for its config when `--config` is not given: BOSUN_CONFIG_PATH,
/// else `~/.bosun/config.json`, else `config.json` in the working directory when there is no home.
pub fn default_config_path() -> PathBuf {
    if let Some(path) = non_empty_env("BOSUN_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".bosun").join("config.json"),
        None => PathBuf::from("config.json"),
    }
}

/// Read the bot's config from `path` (or `default_config_path()`), returning it with the path read.
///
/// A bot runs without any config file: a missing file yields defaults. Unreadable or
/// malformed files are errors naming the path.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("no config at {}, running with defaults", path.display());
            return Ok((Config::default(), path));
        }
        Err(e) => {
            return Err(e).with_context(|| format!("reading config from {}", path.display()));
        }
    };
    let config = serde_json::from_str(&raw)
        .with_context(|| format!("parsing config from {}", path.display()))?;
    log::debug!("loaded config from {}", path.display());
    Ok((config, path))
}
