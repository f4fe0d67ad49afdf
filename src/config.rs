//! Configuration loader and validator for the notifier.
//!
//! Values come from an optional YAML file and are then overridden by the
//! environment variables the deployment scripts already export.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::cursor::WatermarkPolicy;

pub const DEFAULT_STATS_BASE_URL: &str = "https://statistics-api.wildberries.ru/";
pub const DEFAULT_FEEDBACK_BASE_URL: &str = "https://feedbacks-api.wildberries.ru/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Invalid value for {key}: {value:?}")]
    Env { key: &'static str, value: String },
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub telegram: Telegram,
    #[serde(default)]
    pub wildberries: Wildberries,
}

/// Polling and delivery tuning. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub orders_interval_secs: u64,
    pub sales_interval_secs: u64,
    pub feedback_interval_secs: u64,
    /// Page-size ceiling of the statistics API; a shorter page is the last one.
    pub page_size: usize,
    pub pagination_delay_ms: u64,
    /// How far back the first poll of a feed looks (its results are suppressed).
    pub look_back_days: u32,
    pub request_timeout_secs: u64,
    pub send_pacing_ms: u64,
    pub event_pacing_ms: u64,
    pub max_message_len: usize,
    pub watermark_policy: WatermarkPolicy,
}

impl Default for App {
    fn default() -> Self {
        Self {
            orders_interval_secs: 1800,
            sales_interval_secs: 1800,
            feedback_interval_secs: 100,
            page_size: 80_000,
            pagination_delay_ms: 1000,
            look_back_days: 1,
            request_timeout_secs: 30,
            send_pacing_ms: 100,
            event_pacing_ms: 500,
            max_message_len: 4096,
            watermark_policy: WatermarkPolicy::WallClock,
        }
    }
}

impl App {
    pub fn orders_interval(&self) -> Duration {
        Duration::from_secs(self.orders_interval_secs)
    }

    pub fn sales_interval(&self) -> Duration {
        Duration::from_secs(self.sales_interval_secs)
    }

    pub fn feedback_interval(&self) -> Duration {
        Duration::from_secs(self.feedback_interval_secs)
    }

    pub fn pagination_delay(&self) -> Duration {
        Duration::from_millis(self.pagination_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn send_pacing(&self) -> Duration {
        Duration::from_millis(self.send_pacing_ms)
    }

    pub fn event_pacing(&self) -> Duration {
        Duration::from_millis(self.event_pacing_ms)
    }

    pub fn look_back(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.look_back_days))
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    #[serde(default)]
    pub bot_token: String,
    /// Chat ids or `@channel` names; order only affects send pacing.
    #[serde(default)]
    pub chat_ids: Vec<String>,
}

/// Wildberries API credentials and endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Wildberries {
    pub stats_token: String,
    pub feedback_token: String,
    pub stats_base_url: String,
    pub feedback_base_url: String,
}

impl Default for Wildberries {
    fn default() -> Self {
        Self {
            stats_token: String::new(),
            feedback_token: String::new(),
            stats_base_url: DEFAULT_STATS_BASE_URL.to_string(),
            feedback_base_url: DEFAULT_FEEDBACK_BASE_URL.to_string(),
        }
    }
}

/// Load configuration and validate it.
/// - If `path` is `Some`, the file must exist and parse.
/// - If `path` is `None`, starts from the documented defaults.
///
/// Environment overrides are applied in both cases.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut cfg = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            serde_yaml::from_str(&content)?
        }
        None => Config::default(),
    };
    apply_env(&mut cfg, |key| std::env::var(key).ok())?;
    validate(&cfg)?;
    warn_on_short_tokens(&cfg);
    Ok(cfg)
}

/// Override file values with environment variables. `lookup` is injected so
/// tests do not have to mutate the process environment.
pub fn apply_env<F>(cfg: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(token) = var("TELEGRAM_BOT_TOKEN") {
        cfg.telegram.bot_token = token;
    }
    if let Some(ids) = var("TELEGRAM_CHAT_ID") {
        cfg.telegram.chat_ids = ids
            .split(',')
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
    }
    if let Some(token) = var("WB_API_TOKEN") {
        cfg.wildberries.stats_token = token;
    }
    if let Some(token) = var("WB_FEEDBACK_TOKEN") {
        cfg.wildberries.feedback_token = token;
    }
    if let Some(raw) = var("CHECK_INTERVAL") {
        let secs = parse_num("CHECK_INTERVAL", &raw)?;
        cfg.app.orders_interval_secs = secs;
        cfg.app.sales_interval_secs = secs;
    }
    if let Some(raw) = var("FEEDBACK_CHECK_INTERVAL") {
        cfg.app.feedback_interval_secs = parse_num("FEEDBACK_CHECK_INTERVAL", &raw)?;
    }
    if let Some(raw) = var("MAX_ORDERS_PER_REQUEST") {
        cfg.app.page_size = parse_num("MAX_ORDERS_PER_REQUEST", &raw)?;
    }
    if let Some(raw) = var("PAGINATION_DELAY") {
        let secs: u64 = parse_num("PAGINATION_DELAY", &raw)?;
        cfg.app.pagination_delay_ms = secs * 1000;
    }
    if let Some(raw) = var("ORDERS_DAYS_LOOK_BACK") {
        cfg.app.look_back_days = parse_num("ORDERS_DAYS_LOOK_BACK", &raw)?;
    }
    Ok(())
}

fn parse_num<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Env {
        key,
        value: raw.to_string(),
    })
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }
    if cfg.telegram.chat_ids.iter().all(|id| id.trim().is_empty()) {
        return Err(ConfigError::Invalid("telegram.chat_ids must list at least one chat"));
    }
    if cfg.wildberries.stats_token.trim().is_empty() {
        return Err(ConfigError::Invalid("wildberries.stats_token must be non-empty"));
    }
    if cfg.wildberries.feedback_token.trim().is_empty() {
        return Err(ConfigError::Invalid("wildberries.feedback_token must be non-empty"));
    }
    if cfg.wildberries.stats_base_url.trim().is_empty()
        || cfg.wildberries.feedback_base_url.trim().is_empty()
    {
        return Err(ConfigError::Invalid("wildberries base URLs must be non-empty"));
    }

    let app = &cfg.app;
    if app.orders_interval_secs == 0 || app.sales_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.orders/sales_interval_secs must be > 0"));
    }
    if app.feedback_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.feedback_interval_secs must be > 0"));
    }
    if app.page_size == 0 {
        return Err(ConfigError::Invalid("app.page_size must be > 0"));
    }
    if app.max_message_len == 0 {
        return Err(ConfigError::Invalid("app.max_message_len must be > 0"));
    }
    if app.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("app.request_timeout_secs must be > 0"));
    }

    Ok(())
}

fn warn_on_short_tokens(cfg: &Config) {
    if cfg.wildberries.stats_token.len() < 10 {
        warn!("statistics API token looks too short");
    }
    if cfg.wildberries.feedback_token.len() < 10 {
        warn!("feedback API token looks too short");
    }
}

/// Example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  orders_interval_secs: 1800
  sales_interval_secs: 1800
  feedback_interval_secs: 100
  page_size: 80000
  pagination_delay_ms: 1000
  look_back_days: 1
  request_timeout_secs: 30
  send_pacing_ms: 100
  event_pacing_ms: 500
  max_message_len: 4096
  watermark_policy: wall_clock

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  chat_ids:
    - "123456789"
    - "@seller_channel"

wildberries:
  stats_token: "YOUR_STATISTICS_API_TOKEN"
  feedback_token: "YOUR_FEEDBACK_API_TOKEN"
  stats_base_url: "https://statistics-api.wildberries.ru/"
  feedback_base_url: "https://feedbacks-api.wildberries.ru/"
"#
}
