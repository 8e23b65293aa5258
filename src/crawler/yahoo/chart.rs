use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    crawler::{
        classify_status, json_price, parse_body, percent_change, FetchError, PriceQuote, PriceSource,
    },
    declare::SourceKind,
    util,
};

#[derive(Deserialize, Debug)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Deserialize, Debug)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<Value>,
    #[serde(default)]
    chart_previous_close: Option<Value>,
    #[serde(default)]
    previous_close: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Candles>,
}

#[derive(Deserialize, Debug)]
struct Candles {
    #[serde(default)]
    close: Vec<Option<Value>>,
}

/// Candle endpoint: the metadata price, else the last non-null close.
pub struct YahooChart {
    base_url: String,
    timeout: Duration,
}

impl YahooChart {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        YahooChart {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn url(&self, symbol: &str) -> String {
        format!(
            "{}/{}?range=1d&interval=1m",
            self.base_url,
            urlencoding::encode(symbol)
        )
    }
}

#[async_trait]
impl PriceSource for YahooChart {
    fn name(&self) -> &'static str {
        "yahoo chart"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ChartApi
    }

    async fn fetch(&self, symbol: &str) -> Result<PriceQuote, FetchError> {
        let context = format!("{}({})", self.name(), symbol);
        let res = util::http::get(&self.url(symbol), self.timeout).await?;
        if !res.is_success() {
            return Err(classify_status(res.status, false, &context));
        }

        let envelope: ChartEnvelope = parse_body(&res.body, &context)?;
        if let Some(error) = envelope.chart.error.filter(|e| !e.is_null()) {
            return Err(FetchError::NotFound(format!("{} reported {}", context, error)));
        }

        let result = envelope
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| FetchError::NotFound(format!("{} returned no result", context)))?;

        let meta_price = result
            .meta
            .as_ref()
            .and_then(|m| m.regular_market_price.as_ref())
            .and_then(json_price);

        let last_close = || {
            result
                .indicators
                .as_ref()
                .and_then(|i| i.quote.first())
                .and_then(|c| c.close.iter().rev().flatten().find_map(json_price))
        };

        let price = meta_price
            .or_else(last_close)
            .ok_or_else(|| FetchError::NotFound(format!("{} has no price in meta or series", context)))?;

        let previous = result
            .meta
            .as_ref()
            .and_then(|m| m.chart_previous_close.as_ref().or(m.previous_close.as_ref()))
            .and_then(json_price);
        let change_percent = previous.and_then(|previous| percent_change(price, previous));

        Ok(PriceQuote::new(price, self.kind(), symbol).with_change_percent(change_percent))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    async fn serve(status: u16, body: &str) -> (MockServer, YahooChart) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/%5EGDAXI"))
            .and(query_param("interval", "1m"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        let source = YahooChart::new(
            &format!("{}/v8/finance/chart/", server.uri()),
            Duration::from_secs(5),
        );
        (server, source)
    }

    #[tokio::test]
    async fn test_meta_price() {
        let (_server, source) = serve(
            200,
            r#"{"chart":{"result":[{"meta":{"symbol":"^GDAXI","regularMarketPrice":18432.07,"chartPreviousClose":18320},"indicators":{"quote":[{"close":[18400.5,18432.0]}]}}],"error":null}}"#,
        )
        .await;

        let quote = source.fetch("^GDAXI").await.unwrap();
        assert_eq!(quote.price, dec!(18432.07));
        assert_eq!(quote.source, SourceKind::ChartApi);
        let change = quote.change_percent.unwrap().round_dp(2);
        assert_eq!(change, dec!(0.61));
    }

    #[tokio::test]
    async fn test_last_non_null_close() {
        let (_server, source) = serve(
            200,
            r#"{"chart":{"result":[{"meta":{"symbol":"^GDAXI"},"indicators":{"quote":[{"close":[18400.5,18431.94,null,null]}]}}],"error":null}}"#,
        )
        .await;

        let quote = source.fetch("^GDAXI").await.unwrap();
        assert_eq!(quote.price, dec!(18431.94));
        assert_eq!(quote.change_percent, None);
    }

    #[tokio::test]
    async fn test_error_payload_is_not_found() {
        let (_server, source) = serve(
            200,
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        )
        .await;

        assert!(matches!(source.fetch("^GDAXI").await, Err(FetchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let (_server, source) = serve(502, "Bad Gateway").await;
        assert!(matches!(source.fetch("^GDAXI").await, Err(FetchError::Transient(_))));
    }

    #[tokio::test]
    async fn test_empty_series_is_not_found() {
        let (_server, source) = serve(
            200,
            r#"{"chart":{"result":[{"meta":{},"indicators":{"quote":[{"close":[null]}]}}],"error":null}}"#,
        )
        .await;

        assert!(matches!(source.fetch("^GDAXI").await, Err(FetchError::NotFound(_))));
    }
}
