use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::Html;

use crate::{
    crawler::{classify_status, FetchError, PriceQuote, PriceSource},
    declare::SourceKind,
    util::{
        self,
        http::{element, redact_url},
        text,
    },
};

/// A formatted number with optional thousands separators and a decimal point.
static PRICE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\d{1,3}(?:,\d{3})+|\d+)\.\d+").expect("Failed to compile price pattern")
});

/// Rendered page plus a best-effort number match. The symbol is the page URL.
pub struct PageScraper {
    selector: Option<String>,
    timeout: Duration,
}

impl PageScraper {
    pub fn new(selector: Option<String>, timeout: Duration) -> Self {
        PageScraper { selector, timeout }
    }
}

#[async_trait]
impl PriceSource for PageScraper {
    fn name(&self) -> &'static str {
        "page scrape"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Scrape
    }

    async fn fetch(&self, symbol: &str) -> Result<PriceQuote, FetchError> {
        let context = format!("{}({})", self.name(), redact_url(symbol));
        let res = util::http::get(symbol, self.timeout).await?;
        if !res.is_success() {
            return Err(classify_status(res.status, false, &context));
        }

        let price = extract_page_price(&res.body, self.selector.as_deref(), &context)?;
        Ok(PriceQuote::new(price, self.kind(), symbol))
    }
}

/// Finds the headline price in an HTML page.
fn extract_page_price(body: &str, selector: Option<&str>, context: &str) -> Result<Decimal, FetchError> {
    let document = Html::parse_document(body);
    let content = match selector {
        Some(css) => element::select_text(&document, css)
            .map_err(|why| FetchError::Fatal(format!("{}: {}", context, why)))?,
        None => element::visible_text(&document),
    };

    let candidate = best_number(&content)
        .ok_or_else(|| FetchError::NotFound(format!("{} has no number on the page", context)))?;

    text::parse_decimal(candidate, None)
        .map_err(|why| FetchError::NotFound(format!("{}: {}", context, why)))
}

/// Picks the match with the most integer digits, then the most fractional
/// digits. The first one wins a tie.
pub(crate) fn best_number(content: &str) -> Option<&str> {
    let mut best: Option<(&str, (usize, usize))> = None;

    for m in PRICE_PATTERN.find_iter(content) {
        let score = digit_score(m.as_str());
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((m.as_str(), score)),
        }
    }

    best.map(|(s, _)| s)
}

fn digit_score(number: &str) -> (usize, usize) {
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    (
        int_part.chars().filter(char::is_ascii_digit).count(),
        frac_part.len(),
    )
}
