use std::{str::FromStr, sync::Arc};

use chrono::{DateTime, FixedOffset};
use concat_string::concat_string;
use rust_decimal::Decimal;
use scopeguard::defer;

use crate::{
    bot::{MessageId, PublishError, Publisher},
    calculation::fingerprint::{extract_fingerprint, Fingerprint},
    catalog::IndexCatalog,
    crawler::{fallback::PriceResolver, PriceQuote},
    declare::LogicalIndex,
    logging,
    util::{datetime, text::escape_html},
};

/// What a run ended up publishing.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Published {
        index: LogicalIndex,
        fingerprint: Fingerprint,
        message_id: MessageId,
    },
    /// No price was found, or the index was not recognized; a warning went out instead.
    Warned { reason: String, message_id: MessageId },
}

/// Fetches the price of one index, derives its fingerprint and publishes it.
pub struct IndexFingerprintEvent {
    catalog: Arc<IndexCatalog>,
    resolver: Arc<PriceResolver>,
    publisher: Arc<dyn Publisher>,
    offset: FixedOffset,
    tz_label: String,
    /// Master switch over each profile's own pin flag.
    pin_enabled: bool,
}

impl IndexFingerprintEvent {
    pub fn new(
        catalog: Arc<IndexCatalog>,
        resolver: Arc<PriceResolver>,
        publisher: Arc<dyn Publisher>,
        offset: FixedOffset,
        tz_label: &str,
        pin_enabled: bool,
    ) -> Self {
        IndexFingerprintEvent {
            catalog,
            resolver,
            publisher,
            offset,
            tz_label: tz_label.to_string(),
            pin_enabled,
        }
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        datetime::now_in(self.offset)
    }

    pub fn catalog(&self) -> &IndexCatalog {
        &self.catalog
    }

    /// Runs `index` as of `now`.
    ///
    /// A failed price lookup is published as a warning and is not an error;
    /// only a failure to publish the message itself is returned.
    pub async fn execute(
        &self,
        index: LogicalIndex,
        now: DateTime<FixedOffset>,
    ) -> Result<Outcome, PublishError> {
        logging::info_file_async(format!("{} fingerprint run started", index));
        defer! {
            logging::info_file_async(format!("{} fingerprint run finished", index));
        }

        match self.resolver.resolve_price(index).await {
            Ok(quote) => self.publish_price(index, &quote, now).await,
            Err(why) => {
                let text = self.warning_text(index, &why.to_string(), now);
                self.publish_warning(text, why.to_string()).await
            }
        }
    }

    /// Like [`execute`](Self::execute) but takes the index by name; an
    /// unrecognized name is reported without fetching anything.
    pub async fn execute_by_name(
        &self,
        name: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<Outcome, PublishError> {
        match LogicalIndex::from_str(name) {
            Ok(index) => self.execute(index, now).await,
            Err(why) => {
                logging::error_file_async(why.to_string());
                let reason = why.to_string();
                let text = concat_string!("⚠️ ", escape_html(&reason));
                self.publish_warning(text, reason).await
            }
        }
    }

    /// Runs several indices concurrently; results keep the order of `names`.
    pub async fn execute_many(
        &self,
        names: &[String],
        now: DateTime<FixedOffset>,
    ) -> Vec<Result<Outcome, PublishError>> {
        let runs = names.iter().map(|name| self.execute_by_name(name, now));
        futures::future::join_all(runs).await
    }

    async fn publish_price(
        &self,
        index: LogicalIndex,
        quote: &PriceQuote,
        now: DateTime<FixedOffset>,
    ) -> Result<Outcome, PublishError> {
        let fingerprint = extract_fingerprint(quote.price);
        let pin = self.pin_enabled && self.catalog.get(index).is_some_and(|p| p.pin);
        let (label, stamp) = (self.label(index), self.stamp(index, now));
        let price = match quote.change_percent {
            Some(change) => format!("{} ({}%)", quote.price, signed_percent(change)),
            None => quote.price.to_string(),
        };
        let text = concat_string!(
            "<b>", label, "</b> : <b>", fingerprint.as_str(), "</b>\nPrice: ", price, "\n", stamp
        );

        let message_id = self.publisher.publish(&text, pin).await.map_err(|why| {
            logging::error_file_async(format!("Failed to publish {} fingerprint because {}", index, why));
            why
        })?;

        logging::info_file_async(format!(
            "{} published fingerprint {} from {} ({}) as message {}",
            index, fingerprint, quote.price, quote.source, message_id
        ));

        Ok(Outcome::Published {
            index,
            fingerprint,
            message_id,
        })
    }

    async fn publish_warning(&self, text: String, reason: String) -> Result<Outcome, PublishError> {
        let message_id = self.publisher.publish(&text, false).await.map_err(|why| {
            logging::error_file_async(format!("Failed to publish warning because {}", why));
            why
        })?;

        logging::warn_file_async(format!("published warning {}: {}", message_id, reason));

        Ok(Outcome::Warned { reason, message_id })
    }

    fn warning_text(&self, index: LogicalIndex, reason: &str, now: DateTime<FixedOffset>) -> String {
        let (label, stamp, reason) = (self.label(index), self.stamp(index, now), escape_html(reason));
        concat_string!("⚠️ <b>", label, "</b> (", index.as_ref(), ") : ??\n", stamp, "\n", reason)
    }

    fn label(&self, index: LogicalIndex) -> String {
        let label = self
            .catalog
            .get(index)
            .map_or_else(|| index.label(), |p| p.label.as_str());
        escape_html(label)
    }

    /// `14-Jun-2024 21:15 IST`, dated by the trading session the slot reports on.
    fn stamp(&self, index: LogicalIndex, now: DateTime<FixedOffset>) -> String {
        let date = self
            .catalog
            .get(index)
            .map(|p| p.slot.session_date(&now))
            .unwrap_or_else(|| now.date_naive());

        format!(
            "{} {} {}",
            date.format("%d-%b-%Y"),
            now.format("%H:%M"),
            escape_html(&self.tz_label)
        )
    }
}

/// Two decimals with an explicit `+` for a flat or rising market.
fn signed_percent(change: Decimal) -> String {
    let change = change.round_dp(2);
    if change.is_sign_negative() && !change.is_zero() {
        format!("{:.2}", change)
    } else {
        format!("+{:.2}", change.abs())
    }
}
