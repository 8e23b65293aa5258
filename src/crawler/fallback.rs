use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio_retry::RetryIf;

use crate::{
    catalog::IndexCatalog,
    config::Endpoints,
    crawler::{FetchError, PriceQuote, PriceSource, SourceAdapter},
    declare::LogicalIndex,
    logging,
    util::backoff::BackoffPolicy,
};

/// Why no price came out of a chain.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("{0} has no configured sources")]
    UnknownIndex(LogicalIndex),
    #[error("{index}: {source_name} failed fatally, chain aborted: {error}")]
    Aborted {
        index: LogicalIndex,
        source_name: &'static str,
        error: FetchError,
    },
    #[error("{index}: all sources failed after {attempts} attempts, last error: {last}")]
    Exhausted {
        index: LogicalIndex,
        last: FetchError,
        attempts: u32,
    },
}

/// One source and the symbol it knows the index by.
#[derive(Clone)]
pub struct ChainLink {
    pub source: Arc<dyn PriceSource>,
    pub symbol: String,
}

impl ChainLink {
    pub fn new(source: Arc<dyn PriceSource>, symbol: &str) -> Self {
        ChainLink {
            source,
            symbol: symbol.to_string(),
        }
    }
}

/// Walks an index's sources in order until one yields a price.
///
/// Transient failures are retried on the same source with backoff; not-found
/// and exhausted retries move to the next source; a fatal failure ends the
/// chain at once.
pub struct PriceResolver {
    chains: HashMap<LogicalIndex, Vec<ChainLink>>,
    policy: BackoffPolicy,
}

impl PriceResolver {
    pub fn new(policy: BackoffPolicy) -> Self {
        PriceResolver {
            chains: HashMap::new(),
            policy,
        }
    }

    pub fn with_chain(mut self, index: LogicalIndex, links: Vec<ChainLink>) -> Self {
        self.chains.insert(index, links);
        self
    }

    /// Builds one adapter per configured source of every index.
    pub fn from_catalog(
        catalog: &IndexCatalog,
        endpoints: &Endpoints,
        policy: BackoffPolicy,
        timeout: Duration,
    ) -> Self {
        catalog.iter().fold(PriceResolver::new(policy), |resolver, profile| {
            let links = profile
                .sources
                .iter()
                .map(|setting| {
                    let adapter = SourceAdapter::from_setting(setting, endpoints, timeout);
                    ChainLink::new(Arc::new(adapter), &setting.symbol)
                })
                .collect();
            resolver.with_chain(profile.index, links)
        })
    }

    pub async fn resolve_price(&self, index: LogicalIndex) -> Result<PriceQuote, ResolveError> {
        let links = self
            .chains
            .get(&index)
            .filter(|links| !links.is_empty())
            .ok_or(ResolveError::UnknownIndex(index))?;

        let mut total_attempts = 0u32;
        let mut last_error: Option<FetchError> = None;

        for (position, link) in links.iter().enumerate() {
            let source_name = link.source.name();
            let mut attempts = 0u32;

            let result = RetryIf::start(
                self.policy.delays(),
                || {
                    attempts += 1;
                    link.source.fetch(&link.symbol)
                },
                |why: &FetchError| {
                    logging::warn_file_async(format!(
                        "{} {}({}) attempt failed: {}",
                        index, source_name, link.symbol, why
                    ));
                    why.is_retryable()
                },
            )
            .await;

            total_attempts += attempts;

            match result {
                Ok(quote) => {
                    logging::info_file_async(format!(
                        "{} priced at {} by {} after {} attempt(s)",
                        index, quote.price, source_name, total_attempts
                    ));
                    return Ok(quote);
                }
                Err(error) if error.is_fatal() => {
                    logging::error_file_async(format!(
                        "{} chain aborted by {}: {}",
                        index, source_name, error
                    ));
                    return Err(ResolveError::Aborted {
                        index,
                        source_name,
                        error,
                    });
                }
                Err(error) => {
                    if position + 1 < links.len() {
                        logging::warn_file_async(format!(
                            "{} switching away from {} after {} attempt(s): {}",
                            index, source_name, attempts, error
                        ));
                    }
                    last_error = Some(error);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| FetchError::NotFound("no source was tried".to_string()));
        logging::error_file_async(format!(
            "{} exhausted every source after {} attempt(s): {}",
            index, total_attempts, last
        ));

        Err(ResolveError::Exhausted {
            index,
            last,
            attempts: total_attempts,
        })
    }
}
