use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::{
    calculation::fingerprint::PriceValue,
    config::{Endpoints, SourceSetting},
    declare::SourceKind,
    util::http::{HttpError, HttpErrorKind},
};

/// Fallback chain over the configured sources
pub mod fallback;
/// Page text with a numeric pattern match
pub mod scrape;
/// Twelve Data latest quote
pub mod twelvedata;
/// Yahoo Finance quote and chart endpoints
pub mod yahoo;

/// How a single fetch attempt failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Network trouble, 5xx or rate limiting. Worth another try.
    #[error("transient: {0}")]
    Transient(String),
    /// The source has no usable price; another source may.
    #[error("not found: {0}")]
    NotFound(String),
    /// Bad credentials or a request that can never succeed. Stops the chain.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Fatal(_))
    }
}

impl From<HttpError> for FetchError {
    fn from(err: HttpError) -> Self {
        match err.kind {
            HttpErrorKind::Transport => FetchError::Transient(err.message),
            HttpErrorKind::Invalid => FetchError::Fatal(err.message),
            HttpErrorKind::Unusable => FetchError::NotFound(err.message),
        }
    }
}

/// Maps a non-2xx status to a failure class.
///
/// `credentialed` sources treat 400/401/403 as fatal because the key itself
/// is wrong; keyless sources treat them as "this upstream will not serve us".
pub fn classify_status(status: u16, credentialed: bool, context: &str) -> FetchError {
    let message = format!("{} answered HTTP {}", context, status);
    match status {
        408 | 425 | 429 | 500..=599 => FetchError::Transient(message),
        400 | 401 | 403 if credentialed => FetchError::Fatal(message),
        _ => FetchError::NotFound(message),
    }
}

/// One observed price.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub price: Decimal,
    pub source: SourceKind,
    pub symbol: String,
    pub fetched_at: DateTime<Utc>,
    /// Move against the previous close in percent, when the source reports one.
    pub change_percent: Option<Decimal>,
}

impl PriceQuote {
    pub fn new(price: Decimal, source: SourceKind, symbol: &str) -> Self {
        PriceQuote {
            price,
            source,
            symbol: symbol.to_string(),
            fetched_at: Utc::now(),
            change_percent: None,
        }
    }

    pub fn with_change_percent(mut self, change_percent: Option<Decimal>) -> Self {
        self.change_percent = change_percent;
        self
    }
}

/// Percent move from `previous` to `price`; `None` without a usable base.
pub(crate) fn percent_change(price: Decimal, previous: Decimal) -> Option<Decimal> {
    if previous.is_zero() {
        return None;
    }

    price
        .checked_sub(previous)?
        .checked_mul(Decimal::ONE_HUNDRED)?
        .checked_div(previous)
}

/// A single upstream that can price a symbol.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> SourceKind;

    async fn fetch(&self, symbol: &str) -> Result<PriceQuote, FetchError>;
}

/// The concrete upstreams, dispatched by kind.
pub enum SourceAdapter {
    QuoteApi(yahoo::quote::YahooQuote),
    ChartApi(yahoo::chart::YahooChart),
    TimeSeriesLatest(twelvedata::TwelveData),
    Scrape(scrape::PageScraper),
}

impl SourceAdapter {
    pub fn from_setting(setting: &SourceSetting, endpoints: &Endpoints, timeout: Duration) -> Self {
        match setting.kind {
            SourceKind::QuoteApi => {
                SourceAdapter::QuoteApi(yahoo::quote::YahooQuote::new(&endpoints.quote_api, timeout))
            }
            SourceKind::ChartApi => {
                SourceAdapter::ChartApi(yahoo::chart::YahooChart::new(&endpoints.chart_api, timeout))
            }
            SourceKind::TimeSeriesLatest => SourceAdapter::TimeSeriesLatest(
                twelvedata::TwelveData::new(
                    &endpoints.time_series,
                    &endpoints.time_series_api_key,
                    timeout,
                ),
            ),
            SourceKind::Scrape => SourceAdapter::Scrape(scrape::PageScraper::new(
                setting.selector.clone(),
                timeout,
            )),
        }
    }
}

#[async_trait]
impl PriceSource for SourceAdapter {
    fn name(&self) -> &'static str {
        match self {
            SourceAdapter::QuoteApi(s) => s.name(),
            SourceAdapter::ChartApi(s) => s.name(),
            SourceAdapter::TimeSeriesLatest(s) => s.name(),
            SourceAdapter::Scrape(s) => s.name(),
        }
    }

    fn kind(&self) -> SourceKind {
        match self {
            SourceAdapter::QuoteApi(s) => s.kind(),
            SourceAdapter::ChartApi(s) => s.kind(),
            SourceAdapter::TimeSeriesLatest(s) => s.kind(),
            SourceAdapter::Scrape(s) => s.kind(),
        }
    }

    async fn fetch(&self, symbol: &str) -> Result<PriceQuote, FetchError> {
        match self {
            SourceAdapter::QuoteApi(s) => s.fetch(symbol).await,
            SourceAdapter::ChartApi(s) => s.fetch(symbol).await,
            SourceAdapter::TimeSeriesLatest(s) => s.fetch(symbol).await,
            SourceAdapter::Scrape(s) => s.fetch(symbol).await,
        }
    }
}

/// Reads a JSON price that may be a number or a quoted string.
pub(crate) fn json_price(value: &Value) -> Option<Decimal> {
    let price = match value {
        Value::Number(n) => PriceValue::Float(n.as_f64()?).to_decimal(),
        Value::String(s) => PriceValue::Text(s).to_decimal(),
        _ => return None,
    };
    price.ok()
}

/// Deserializes an upstream body, treating a schema mismatch as "no price here".
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(
    body: &str,
    context: &str,
) -> Result<T, FetchError> {
    serde_json::from_str(body).map_err(|why| {
        FetchError::NotFound(format!("{} returned an unexpected payload: {}", context, why))
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(429, false, "q").is_retryable());
        assert!(classify_status(503, true, "q").is_retryable());
        assert!(classify_status(408, false, "q").is_retryable());
        assert_eq!(classify_status(404, true, "q"), FetchError::NotFound("q answered HTTP 404".to_string()));
        assert!(classify_status(401, true, "q").is_fatal());
        assert!(classify_status(403, true, "q").is_fatal());
        assert_eq!(
            classify_status(401, false, "q"),
            FetchError::NotFound("q answered HTTP 401".to_string())
        );
        assert!(matches!(classify_status(302, false, "q"), FetchError::NotFound(_)));
    }

    #[test]
    fn test_from_http_error() {
        let transient: FetchError = HttpError {
            message: "timed out".to_string(),
            kind: HttpErrorKind::Transport,
        }
        .into();
        assert!(transient.is_retryable());

        let fatal: FetchError = HttpError {
            message: "relative URL without a base".to_string(),
            kind: HttpErrorKind::Invalid,
        }
        .into();
        assert!(fatal.is_fatal());

        let unusable: FetchError = HttpError {
            message: "too many redirects".to_string(),
            kind: HttpErrorKind::Unusable,
        }
        .into();
        assert_eq!(unusable, FetchError::NotFound("too many redirects".to_string()));
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(dec!(110), dec!(100)), Some(dec!(10)));
        assert_eq!(percent_change(dec!(99.5), dec!(100)), Some(dec!(-0.5)));
        assert_eq!(percent_change(dec!(1), Decimal::ZERO), None);
    }

    #[test]
    fn test_json_price() {
        assert_eq!(json_price(&json!(25176.85)), Some(dec!(25176.85)));
        assert_eq!(json_price(&json!("18,432.07000")), Some(dec!(18432.07)));
        assert_eq!(json_price(&json!(41000)), Some(dec!(41000)));
        assert_eq!(json_price(&json!(null)), None);
        assert_eq!(json_price(&json!("n/a")), None);
    }

    #[test]
    fn test_parse_body_mismatch_is_not_found() {
        let err = parse_body::<Vec<u8>>("<html>", "quote").unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }
}
