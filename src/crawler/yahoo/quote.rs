use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::{
    crawler::{classify_status, json_price, parse_body, FetchError, PriceQuote, PriceSource},
    declare::SourceKind,
    logging::Logger,
    util,
};

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("crawler"));

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QuoteEnvelope {
    quote_response: Option<QuoteResponse>,
}

#[derive(Deserialize, Debug)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<QuoteResult>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QuoteResult {
    #[serde(default)]
    regular_market_price: Option<serde_json::Value>,
    #[serde(default)]
    post_market_price: Option<serde_json::Value>,
    #[serde(default)]
    regular_market_previous_close: Option<serde_json::Value>,
    #[serde(default)]
    regular_market_change_percent: Option<serde_json::Value>,
}

/// Structured market-quote endpoint.
pub struct YahooQuote {
    base_url: String,
    timeout: Duration,
}

impl YahooQuote {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        YahooQuote {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn url(&self, symbol: &str) -> String {
        format!("{}?symbols={}", self.base_url, urlencoding::encode(symbol))
    }
}

#[async_trait]
impl PriceSource for YahooQuote {
    fn name(&self) -> &'static str {
        "yahoo quote"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::QuoteApi
    }

    async fn fetch(&self, symbol: &str) -> Result<PriceQuote, FetchError> {
        let context = format!("{}({})", self.name(), symbol);
        let res = util::http::get(&self.url(symbol), self.timeout).await?;
        if !res.is_success() {
            return Err(classify_status(res.status, false, &context));
        }

        let envelope: QuoteEnvelope = parse_body(&res.body, &context)?;
        let first = envelope
            .quote_response
            .and_then(|r| r.result.into_iter().next())
            .ok_or_else(|| FetchError::NotFound(format!("{} returned no result", context)))?;

        // regular market first, then the post-market and previous-close fields
        let fields = [
            ("regularMarketPrice", &first.regular_market_price),
            ("postMarketPrice", &first.post_market_price),
            ("regularMarketPreviousClose", &first.regular_market_previous_close),
        ];

        let change_percent = first.regular_market_change_percent.as_ref().and_then(json_price);

        for (field, value) in fields {
            if let Some(price) = value.as_ref().and_then(json_price) {
                if field != "regularMarketPrice" {
                    LOGGER.warn(format!("{} has no regularMarketPrice, using {}", context, field));
                }
                // the reported move belongs to the regular session only
                let change_percent = change_percent.filter(|_| field == "regularMarketPrice");
                return Ok(PriceQuote::new(price, self.kind(), symbol).with_change_percent(change_percent));
            }
        }

        Err(FetchError::NotFound(format!("{} has no price field", context)))
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

    async fn serve(status: u16, body: &str) -> (MockServer, YahooQuote) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v7/finance/quote"))
            .and(query_param("symbols", "^BSESN"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        let source = YahooQuote::new(
            &format!("{}/v7/finance/quote", server.uri()),
            Duration::from_secs(5),
        );
        (server, source)
    }

    #[tokio::test]
    async fn test_regular_market_price() {
        let (_server, source) = serve(
            200,
            r#"{"quoteResponse":{"result":[{"symbol":"^BSESN","regularMarketPrice":80597.66,"regularMarketChangePercent":0.6132,"regularMarketPreviousClose":80000.5}],"error":null}}"#,
        )
        .await;

        let quote = source.fetch("^BSESN").await.unwrap();
        assert_eq!(quote.price, dec!(80597.66));
        assert_eq!(quote.source, SourceKind::QuoteApi);
        assert_eq!(quote.symbol, "^BSESN");
        assert_eq!(quote.change_percent, Some(dec!(0.6132)));
    }

    #[tokio::test]
    async fn test_falls_back_to_previous_close() {
        let (_server, source) = serve(
            200,
            r#"{"quoteResponse":{"result":[{"symbol":"^BSESN","regularMarketChangePercent":0.5,"regularMarketPreviousClose":80000.5}]}}"#,
        )
        .await;

        let quote = source.fetch("^BSESN").await.unwrap();
        assert_eq!(quote.price, dec!(80000.5));
        assert_eq!(quote.change_percent, None);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_found() {
        let (_server, source) = serve(200, r#"{"quoteResponse":{"result":[],"error":null}}"#).await;
        assert!(matches!(source.fetch("^BSESN").await, Err(FetchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_status_classification() {
        let (_server, source) = serve(429, "Too Many Requests").await;
        assert!(matches!(source.fetch("^BSESN").await, Err(FetchError::Transient(_))));

        let (_server, source) = serve(401, r#"{"finance":{"error":{"code":"Unauthorized"}}}"#).await;
        assert!(matches!(source.fetch("^BSESN").await, Err(FetchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_not_found() {
        let (_server, source) = serve(200, "<html>consent</html>").await;
        assert!(matches!(source.fetch("^BSESN").await, Err(FetchError::NotFound(_))));
    }
}
