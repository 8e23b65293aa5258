use std::{collections::HashMap, env, path::PathBuf, str::FromStr};

use anyhow::Result;
use chrono::FixedOffset;
use config::{Config as config_config, File as config_file};
use serde::{Deserialize, Serialize};

use crate::{
    declare::{LogicalIndex, SourceKind},
    util::datetime,
};

const CONFIG_PATH: &str = "app.json";

/// Configuration that makes publishing impossible or ambiguous.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown INDEX: {0}")]
    UnknownIndex(String),
    #[error("{index}: slot time '{value}' is not HH:MM")]
    BadSlotTime { index: LogicalIndex, value: String },
    #[error("{index}: '{value}' is not a weekday")]
    UnknownWeekday { index: LogicalIndex, value: String },
    #[error("{0}: no price sources configured")]
    EmptySources(LogicalIndex),
    #[error("{0}: a scrape source needs a page URL")]
    MissingPageUrl(LogicalIndex),
    #[error("{0}: the time-series source needs an API key")]
    MissingApiKey(LogicalIndex),
    #[error("{0}: configured more than once")]
    DuplicateIndex(LogicalIndex),
    #[error("UTC offset of {0} minutes is out of range")]
    BadOffset(i32),
    #[error("{0} is not configured")]
    Missing(&'static str),
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct App {
    pub bot: Bot,
    pub system: System,
    pub retry: Retry,
    pub endpoints: Endpoints,
    /// Empty means the built-in table of every `LogicalIndex`.
    pub indices: Vec<IndexSetting>,
}

const UTC_OFFSET_MINUTES: &str = "UTC_OFFSET_MINUTES";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct System {
    /// Offset of the publishing clock from UTC. 330 is IST.
    pub utc_offset_minutes: i32,
    pub timezone_label: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Rolled-over slots before this hour are labelled with the previous date.
    pub rollover_cutoff_hour: u32,
    pub announce_startup: bool,
}

impl Default for System {
    fn default() -> Self {
        System {
            utc_offset_minutes: 330,
            timezone_label: "IST".to_string(),
            poll_interval_secs: 10,
            request_timeout_secs: 20,
            rollover_cutoff_hour: 6,
            announce_startup: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Retry {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for Retry {
    fn default() -> Self {
        Retry {
            max_attempts: 5,
            base_delay_ms: 2_000,
            factor: 2.0,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}

const TWELVEDATA_API_KEY: &str = "TWELVEDATA_API_KEY";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Endpoints {
    pub quote_api: String,
    pub chart_api: String,
    pub time_series: String,
    pub time_series_api_key: String,
    /// Extra page per index, scraped after every structured source.
    pub pages: HashMap<String, String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            quote_api: "https://query1.finance.yahoo.com/v7/finance/quote".to_string(),
            chart_api: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            time_series: "https://api.twelvedata.com/quote".to_string(),
            time_series_api_key: String::new(),
            pages: HashMap::new(),
        }
    }
}

impl Endpoints {
    /// The page configured for `index`, matching keys case-insensitively.
    pub fn page_for(&self, index: LogicalIndex) -> Option<&str> {
        self.pages
            .iter()
            .find(|(key, url)| {
                !url.trim().is_empty() && LogicalIndex::from_str(key).ok() == Some(index)
            })
            .map(|(_, url)| url.trim())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexSetting {
    pub index: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub pin: Option<bool>,
    /// `HH:MM` in the publishing clock.
    #[serde(default)]
    pub time: Option<String>,
    /// `Mon`..`Sun`; defaults to Monday through Friday.
    #[serde(default)]
    pub weekdays: Option<Vec<String>>,
    #[serde(default)]
    pub rollover: Option<bool>,
    #[serde(default)]
    pub sources: Vec<SourceSetting>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SourceSetting {
    pub kind: SourceKind,
    /// Upstream symbol, or the page URL for `scrape`.
    #[serde(default)]
    pub symbol: String,
    /// CSS selector narrowing a scraped page.
    #[serde(default)]
    pub selector: Option<String>,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct Bot {
    pub telegram: Telegram,
}

const TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
const BOT_TOKEN: &str = "BOT_TOKEN";
const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
const CHAT_ID: &str = "CHAT_ID";
const PIN_AFTER_SEND: &str = "PIN_AFTER_SEND";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Telegram {
    pub token: String,
    pub chat_id: String,
    /// Master switch; an index pins only when both this and its profile allow it.
    pub pin: bool,
    pub unpin_before_pin: bool,
    pub api_base: String,
}

impl Default for Telegram {
    fn default() -> Self {
        Telegram {
            token: String::new(),
            chat_id: String::new(),
            pin: true,
            unpin_before_pin: true,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

impl App {
    /// Reads `app.json` when present, then applies environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = config_path();
        let app = if config_path.exists() {
            config_config::builder()
                .add_source(config_file::from(config_path))
                .build()?
                .try_deserialize::<App>()?
        } else {
            App::default()
        };

        Ok(app.override_with_env())
    }

    /// Overrides values from the json file with the process environment.
    pub fn override_with_env(self) -> Self {
        self.override_with(|key| env::var(key).ok())
    }

    /// Overrides values using `lookup` as the environment.
    pub fn override_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(TELEGRAM_TOKEN).or_else(|| non_empty(BOT_TOKEN)) {
            self.bot.telegram.token = token.trim().to_string();
        }

        if let Some(chat_id) = non_empty(TELEGRAM_CHAT_ID).or_else(|| non_empty(CHAT_ID)) {
            self.bot.telegram.chat_id = chat_id.trim().to_string();
        }

        if let Some(pin) = non_empty(PIN_AFTER_SEND) {
            self.bot.telegram.pin = parse_flag(&pin).unwrap_or(self.bot.telegram.pin);
        }

        if let Some(key) = non_empty(TWELVEDATA_API_KEY) {
            self.endpoints.time_series_api_key = key.trim().to_string();
        }

        if let Some(offset) = non_empty(UTC_OFFSET_MINUTES) {
            if let Ok(minutes) = offset.trim().parse::<i32>() {
                self.system.utc_offset_minutes = minutes;
            }
        }

        for index in LogicalIndex::iterator() {
            if let Some(url) = non_empty(&index.page_url_env()) {
                self.endpoints
                    .pages
                    .retain(|key, _| LogicalIndex::from_str(key).ok() != Some(index));
                self.endpoints
                    .pages
                    .insert(index.to_string(), url.trim().to_string());
            }
        }

        self
    }

    /// Fails when there is nowhere to publish.
    pub fn ensure_publishable(&self) -> Result<(), ConfigError> {
        if self.bot.telegram.token.is_empty() {
            return Err(ConfigError::Missing(TELEGRAM_TOKEN));
        }

        if self.bot.telegram.chat_id.is_empty() {
            return Err(ConfigError::Missing(TELEGRAM_CHAT_ID));
        }

        Ok(())
    }

    /// The fixed offset every slot and timestamp is read in.
    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        let minutes = self.system.utc_offset_minutes;
        datetime::offset_from_minutes(minutes).map_err(|_| ConfigError::BadOffset(minutes))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Returns the path of the configuration file.
fn config_path() -> PathBuf {
    PathBuf::from(CONFIG_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let app = App::default();
        assert_eq!(app.system.utc_offset_minutes, 330);
        assert_eq!(app.system.timezone_label, "IST");
        assert_eq!(app.system.poll_interval_secs, 10);
        assert_eq!(app.retry.max_attempts, 5);
        assert!(app.bot.telegram.pin);
        assert!(app.indices.is_empty());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let json = r#"{
            "bot": { "telegram": { "token": "t", "chat_id": "-100" } },
            "retry": { "max_attempts": 3 },
            "indices": [
                { "index": "dax", "time": "21:30", "sources": [
                    { "kind": "quote_api", "symbol": "^GDAXI" },
                    { "kind": "scrape", "symbol": "https://example.com/dax", "selector": ".last" }
                ] }
            ]
        }"#;
        let app: App = serde_json::from_str(json).unwrap();
        assert_eq!(app.bot.telegram.chat_id, "-100");
        assert_eq!(app.bot.telegram.api_base, "https://api.telegram.org");
        assert_eq!(app.retry.max_attempts, 3);
        assert_eq!(app.retry.base_delay_ms, 2_000);
        assert_eq!(app.indices.len(), 1);
        assert_eq!(app.indices[0].sources[1].kind, SourceKind::Scrape);
        assert_eq!(app.indices[0].sources[1].selector.as_deref(), Some(".last"));
    }

    #[test]
    fn test_override_with_env() {
        let app = App::default().override_with(env_of(&[
            ("BOT_TOKEN", "123:abc"),
            ("CHAT_ID", "-1001"),
            ("PIN_AFTER_SEND", "0"),
            ("TWELVEDATA_API_KEY", "k"),
            ("UTC_OFFSET_MINUTES", "60"),
            ("URL_SENSEX", "https://example.com/sensex"),
        ]));

        assert_eq!(app.bot.telegram.token, "123:abc");
        assert_eq!(app.bot.telegram.chat_id, "-1001");
        assert!(!app.bot.telegram.pin);
        assert_eq!(app.endpoints.time_series_api_key, "k");
        assert_eq!(app.system.utc_offset_minutes, 60);
        assert_eq!(
            app.endpoints.page_for(LogicalIndex::Sensex),
            Some("https://example.com/sensex")
        );
        assert_eq!(app.endpoints.page_for(LogicalIndex::Dax), None);
    }

    #[test]
    fn test_telegram_names_take_precedence() {
        let app = App::default().override_with(env_of(&[
            ("TELEGRAM_TOKEN", "primary"),
            ("BOT_TOKEN", "secondary"),
            ("TELEGRAM_CHAT_ID", ""),
            ("CHAT_ID", "42"),
        ]));
        assert_eq!(app.bot.telegram.token, "primary");
        assert_eq!(app.bot.telegram.chat_id, "42");
    }

    #[test]
    fn test_env_page_replaces_json_page() {
        let mut app = App::default();
        app.endpoints
            .pages
            .insert("dow".to_string(), "https://old.example.com".to_string());
        let app = app.override_with(env_of(&[("URL_DOWJONES", "https://new.example.com")]));
        assert_eq!(app.endpoints.pages.len(), 1);
        assert_eq!(
            app.endpoints.page_for(LogicalIndex::DowJones),
            Some("https://new.example.com")
        );
    }

    #[test]
    fn test_ensure_publishable() {
        assert_eq!(
            App::default().ensure_publishable(),
            Err(ConfigError::Missing("TELEGRAM_TOKEN"))
        );
        let app = App::default().override_with(env_of(&[("BOT_TOKEN", "t"), ("CHAT_ID", "1")]));
        assert!(app.ensure_publishable().is_ok());
    }

    #[test]
    fn test_utc_offset() {
        let mut app = App::default();
        assert_eq!(app.utc_offset().unwrap().local_minus_utc(), 330 * 60);

        app.system.utc_offset_minutes = 24 * 60;
        assert_eq!(app.utc_offset(), Err(ConfigError::BadOffset(1440)));
    }
}
