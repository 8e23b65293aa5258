use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    crawler::{classify_status, json_price, parse_body, FetchError, PriceQuote, PriceSource},
    declare::SourceKind,
    util,
};

/// The latest-quote body. Errors come back as HTTP 200 with
/// `status: "error"` and an HTTP-like `code`.
#[derive(Deserialize, Debug)]
struct LatestQuote {
    #[serde(default)]
    close: Option<Value>,
    #[serde(default)]
    percent_change: Option<Value>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

/// Twelve Data latest-value endpoint. Needs an API key.
pub struct TwelveData {
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl TwelveData {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        TwelveData {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }

    fn url(&self, symbol: &str) -> String {
        format!(
            "{}?symbol={}&apikey={}",
            self.base_url,
            urlencoding::encode(symbol),
            urlencoding::encode(&self.api_key)
        )
    }
}

#[async_trait]
impl PriceSource for TwelveData {
    fn name(&self) -> &'static str {
        "twelvedata"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::TimeSeriesLatest
    }

    async fn fetch(&self, symbol: &str) -> Result<PriceQuote, FetchError> {
        let context = format!("{}({})", self.name(), symbol);
        if self.api_key.is_empty() {
            return Err(FetchError::Fatal(format!("{} has no API key", context)));
        }

        let res = util::http::get(&self.url(symbol), self.timeout).await?;
        if !res.is_success() {
            return Err(classify_status(res.status, true, &context));
        }

        let latest: LatestQuote = parse_body(&res.body, &context)?;
        if latest.status.as_deref() == Some("error") {
            let code = latest.code.unwrap_or(400);
            let mut err = classify_status(code, true, &context);
            if let Some(message) = latest.message {
                err = match err {
                    FetchError::Transient(m) => FetchError::Transient(format!("{}: {}", m, message)),
                    FetchError::NotFound(m) => FetchError::NotFound(format!("{}: {}", m, message)),
                    FetchError::Fatal(m) => FetchError::Fatal(format!("{}: {}", m, message)),
                };
            }
            return Err(err);
        }

        let change_percent = latest.percent_change.as_ref().and_then(json_price);
        latest
            .close
            .as_ref()
            .and_then(json_price)
            .map(|price| PriceQuote::new(price, self.kind(), symbol).with_change_percent(change_percent))
            .ok_or_else(|| FetchError::NotFound(format!("{} has no close", context)))
    }
}
