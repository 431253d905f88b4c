//! Source fan-out and weighted index computation.
//!
//! For a simple symbol every adapter that quotes it is called concurrently,
//! each under its own timeout. Failures are logged and dropped; only the
//! fulfilled observations count toward the quorum. Composite symbols
//! (`"A+B"`) aggregate each constituent and average them.

use std::collections::HashSet;
use std::sync::Arc;

use depeg_types::price::{AggregatedIndex, PriceObservation, PricePoint};
use depeg_types::time::Clock;
use depeg_types::{feed_symbol, normalize_symbol, price_to_ppm, COMPOSITE_SEPARATOR};
use futures::future::{join_all, try_join_all};
use tracing::{debug, info, warn};

use crate::history::PriceHistoryStore;
use crate::sources::PriceSource;
use crate::{OracleError, Result};

/// Default source quorum.
pub const DEFAULT_MIN_SOURCES: usize = 3;

/// Quorum settings.
#[derive(Clone, Debug)]
pub struct QuorumPolicy {
    pub min_sources: usize,
    /// Symbols that only ever have one source and need exactly one.
    pub single_source_symbols: HashSet<String>,
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self {
            min_sources: DEFAULT_MIN_SOURCES,
            single_source_symbols: HashSet::from(["FLR".to_string()]),
        }
    }
}

impl QuorumPolicy {
    pub fn required(&self, symbol: &str) -> usize {
        if self.single_source_symbols.contains(symbol) {
            1
        } else {
            self.min_sources.max(1)
        }
    }
}

/// Weighted mean index over fulfilled observations.
///
/// Returns `None` for an empty set or a non-positive total weight.
pub fn weighted_index(symbol: &str, observations: Vec<PriceObservation>, timestamp: u64) -> Option<AggregatedIndex> {
    let total_weight: f64 = observations.iter().map(|o| o.weight).sum();
    if observations.is_empty() || !total_weight.is_finite() || total_weight <= 0.0 {
        return None;
    }
    let weighted_sum: f64 = observations.iter().map(|o| o.price * o.weight).sum();
    let price = weighted_sum / total_weight;

    let n = observations.len() as f64;
    let mean = observations.iter().map(|o| o.price).sum::<f64>() / n;
    let variance = observations.iter().map(|o| (o.price - mean).powi(2)).sum::<f64>() / n;
    let min_price = observations.iter().map(|o| o.price).fold(f64::INFINITY, f64::min);
    let max_price = observations.iter().map(|o| o.price).fold(f64::NEG_INFINITY, f64::max);

    Some(AggregatedIndex {
        symbol: symbol.to_string(),
        price,
        price_ppm: price_to_ppm(price),
        timestamp,
        source_count: observations.len(),
        min_price,
        max_price,
        std_dev: variance.sqrt(),
        details: observations,
    })
}

/// Combine constituent indices into a composite: arithmetic mean of prices,
/// outer envelope of min/max, summed source counts.
pub fn combine(symbol: &str, parts: Vec<AggregatedIndex>, timestamp: u64) -> Option<AggregatedIndex> {
    if parts.is_empty() {
        return None;
    }
    let n = parts.len() as f64;
    let price = parts.iter().map(|p| p.price).sum::<f64>() / n;
    let std_dev = parts.iter().map(|p| p.std_dev).sum::<f64>() / n;
    let min_price = parts.iter().map(|p| p.min_price).fold(f64::INFINITY, f64::min);
    let max_price = parts.iter().map(|p| p.max_price).fold(f64::NEG_INFINITY, f64::max);
    let source_count = parts.iter().map(|p| p.source_count).sum();
    let details = parts
        .into_iter()
        .flat_map(|p| {
            let prefix = p.symbol;
            p.details.into_iter().map(move |mut d| {
                d.source = format!("{prefix}-{}", d.source);
                d
            })
        })
        .collect();

    Some(AggregatedIndex {
        symbol: symbol.to_string(),
        price,
        price_ppm: price_to_ppm(price),
        timestamp,
        source_count,
        min_price,
        max_price,
        std_dev,
        details,
    })
}

/// Pulls adapters, enforces the quorum, and advances price history.
pub struct Aggregator {
    sources: Vec<Arc<dyn PriceSource>>,
    history: Arc<PriceHistoryStore>,
    clock: Arc<dyn Clock>,
    quorum: QuorumPolicy,
}

impl Aggregator {
    pub fn new(
        sources: Vec<Arc<dyn PriceSource>>,
        history: Arc<PriceHistoryStore>,
        clock: Arc<dyn Clock>,
        quorum: QuorumPolicy,
    ) -> Self {
        Self {
            sources,
            history,
            clock,
            quorum,
        }
    }

    pub fn history(&self) -> &Arc<PriceHistoryStore> {
        &self.history
    }

    pub fn quorum(&self) -> &QuorumPolicy {
        &self.quorum
    }

    /// Aggregate `symbol` (simple or composite) and append the resulting
    /// price to its history.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Type`] for a malformed symbol
    /// - [`OracleError::InsufficientSources`] when any simple symbol involved
    ///   misses its quorum
    pub async fn aggregate(&self, symbol: &str) -> Result<AggregatedIndex> {
        let symbol = normalize_symbol(symbol)?;
        let index = if symbol.contains(COMPOSITE_SEPARATOR) {
            let parts = try_join_all(
                symbol
                    .split(COMPOSITE_SEPARATOR)
                    .map(|constituent| self.aggregate_simple(constituent)),
            )
            .await?;
            let index = combine(&symbol, parts, self.clock.now())
                .ok_or_else(|| OracleError::UnknownSymbol(symbol.clone()))?;
            self.record(&index);
            index
        } else {
            self.aggregate_simple(&symbol).await?
        };
        info!(
            symbol = %index.symbol,
            price = index.price,
            sources = index.source_count,
            "index aggregated"
        );
        Ok(index)
    }

    async fn aggregate_simple(&self, symbol: &str) -> Result<AggregatedIndex> {
        let observations = self.observe(symbol).await;
        let required = self.quorum.required(symbol);
        if observations.len() < required {
            warn!(symbol, got = observations.len(), required, "source quorum not met");
            return Err(OracleError::InsufficientSources {
                got: observations.len(),
                required,
            });
        }
        let index = weighted_index(symbol, observations, self.clock.now())
            .ok_or_else(|| OracleError::UnknownSymbol(symbol.to_string()))?;
        self.record(&index);
        Ok(index)
    }

    fn record(&self, index: &AggregatedIndex) {
        self.history.append(
            &feed_symbol(&index.symbol),
            PricePoint::new(index.timestamp, index.price),
        );
    }

    /// Call every adapter that quotes `symbol`; keep only fulfilled results.
    async fn observe(&self, symbol: &str) -> Vec<PriceObservation> {
        let calls = self.sources.iter().filter_map(|source| {
            let weight = source.weight(symbol)?;
            Some(async move {
                let timeout = source.timeout();
                let outcome = match tokio::time::timeout(timeout, source.fetch_price(symbol)).await {
                    Ok(Ok(price)) => crate::validate_price(price),
                    Ok(Err(e)) => Err(OracleError::SourceError {
                        venue: source.name().to_string(),
                        detail: e.to_string(),
                    }),
                    Err(_) => Err(OracleError::SourceTimeout {
                        venue: source.name().to_string(),
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    }),
                };
                match outcome {
                    Ok(price) => Some(PriceObservation {
                        source: source.name().to_string(),
                        price,
                        weight,
                        timestamp: self.clock.now(),
                    }),
                    Err(e) => {
                        warn!(symbol, error = %e, "price source dropped");
                        None
                    }
                }
            })
        });
        let observations: Vec<PriceObservation> = join_all(calls).await.into_iter().flatten().collect();
        debug!(symbol, fulfilled = observations.len(), "sources settled");
        observations
    }
}
