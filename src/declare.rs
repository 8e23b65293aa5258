use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use strum::{AsRefStr, EnumIter, IntoEnumIterator};

use crate::config::ConfigError;

/// A tracked market index, independent of any upstream's symbol.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, AsRefStr, EnumIter)]
#[strum(serialize_all = "UPPERCASE")]
pub enum LogicalIndex {
    Taiwan,
    Kospi,
    HangSeng,
    Sensex,
    Dax,
    DowJones,
}

impl LogicalIndex {
    pub fn iterator() -> impl Iterator<Item = Self> {
        Self::iter()
    }

    /// Name shown in published messages.
    pub fn label(&self) -> &'static str {
        match self {
            LogicalIndex::Taiwan => "Taiwan",
            LogicalIndex::Kospi => "KOSPI",
            LogicalIndex::HangSeng => "Hang Seng",
            LogicalIndex::Sensex => "Sensex",
            LogicalIndex::Dax => "DAX",
            LogicalIndex::DowJones => "Dow Jones",
        }
    }

    /// Symbol used by both Yahoo endpoints.
    pub fn yahoo_symbol(&self) -> &'static str {
        match self {
            LogicalIndex::Taiwan => "^TWII",
            LogicalIndex::Kospi => "^KS11",
            LogicalIndex::HangSeng => "^HSI",
            LogicalIndex::Sensex => "^BSESN",
            LogicalIndex::Dax => "^GDAXI",
            LogicalIndex::DowJones => "^DJI",
        }
    }

    /// Default publishing slot (`HH:MM`) in the bot's local time.
    pub fn default_slot(&self) -> &'static str {
        match self {
            LogicalIndex::Taiwan => "11:05",
            LogicalIndex::Kospi => "12:05",
            LogicalIndex::HangSeng => "13:45",
            LogicalIndex::Sensex => "15:45",
            LogicalIndex::Dax => "21:15",
            LogicalIndex::DowJones => "01:41",
        }
    }

    /// Whether the default slot falls after midnight of the trading day.
    pub fn default_rollover(&self) -> bool {
        matches!(self, LogicalIndex::DowJones)
    }

    /// Environment variable holding a page to scrape for this index.
    pub fn page_url_env(&self) -> String {
        format!("URL_{}", self.as_ref())
    }
}

impl fmt::Display for LogicalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl FromStr for LogicalIndex {
    type Err = ConfigError;

    /// Case-insensitive; spaces, `_`, `-` and a leading `^` are ignored, and
    /// the upstream symbols are accepted as aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .trim_start_matches('^')
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_uppercase();

        match normalized.as_str() {
            "TAIWAN" | "TWII" | "TAIEX" => Ok(LogicalIndex::Taiwan),
            "KOSPI" | "KS11" => Ok(LogicalIndex::Kospi),
            "HANGSENG" | "HSI" => Ok(LogicalIndex::HangSeng),
            "SENSEX" | "BSESN" => Ok(LogicalIndex::Sensex),
            "DAX" | "GDAXI" => Ok(LogicalIndex::Dax),
            "DOWJONES" | "DOW" | "DJI" => Ok(LogicalIndex::DowJones),
            _ => Err(ConfigError::UnknownIndex(s.trim().to_string())),
        }
    }
}

impl Serialize for LogicalIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_ref())
    }
}

impl<'de> Deserialize<'de> for LogicalIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        LogicalIndex::from_str(&s).map_err(de::Error::custom)
    }
}

/// The upstream families a price can come from.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceKind {
    /// Structured market-quote endpoint.
    QuoteApi,
    /// Candle endpoint; metadata price or last close.
    ChartApi,
    /// Minimal latest-value endpoint, needs an API key.
    TimeSeriesLatest,
    /// Rendered page plus a numeric pattern match.
    Scrape,
}
