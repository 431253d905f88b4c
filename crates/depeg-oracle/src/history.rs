//! Per-symbol index price history.
//!
//! Appends to one symbol are serialized by a per-series writer lock; readers
//! take an [`ArcSwap`] snapshot and never block a writer. A write publishes a
//! new vector with samples older than the retention window pruned.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use depeg_types::price::PricePoint;
use depeg_types::SECONDS_PER_DAY;
use parking_lot::{Mutex, RwLock};
use tracing::{trace, warn};

use crate::Result;

/// Default retention window.
pub const DEFAULT_RETENTION_DAYS: u64 = 90;

/// Durable storage for appended samples.
pub trait HistorySink: Send + Sync {
    /// Record one appended sample. `cutoff` is the oldest timestamp still retained.
    fn record(&self, symbol: &str, point: &PricePoint, cutoff: u64) -> Result<()>;
}

struct Series {
    writer: Mutex<()>,
    points: ArcSwap<Vec<PricePoint>>,
}

impl Series {
    fn new() -> Self {
        Self {
            writer: Mutex::new(()),
            points: ArcSwap::from_pointee(Vec::new()),
        }
    }
}

/// Append-only, retention-bounded price series keyed by feed symbol.
pub struct PriceHistoryStore {
    series: RwLock<HashMap<String, Arc<Series>>>,
    retention_secs: u64,
    sink: Option<Arc<dyn HistorySink>>,
}

impl Default for PriceHistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}

impl PriceHistoryStore {
    pub fn new(retention_days: u64) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            retention_secs: retention_days.saturating_mul(SECONDS_PER_DAY),
            sink: None,
        }
    }

    /// Mirror every append into `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn retention_secs(&self) -> u64 {
        self.retention_secs
    }

    fn series(&self, symbol: &str) -> Arc<Series> {
        if let Some(s) = self.series.read().get(symbol) {
            return Arc::clone(s);
        }
        let mut map = self.series.write();
        Arc::clone(
            map.entry(symbol.to_string())
                .or_insert_with(|| Arc::new(Series::new())),
        )
    }

    /// Append a sample and prune everything older than the retention window,
    /// measured back from the sample's own timestamp.
    ///
    /// Out-of-order samples are inserted at their sorted position. A sample
    /// at an already stored timestamp replaces it, matching the durable
    /// `(symbol, timestamp)` key.
    pub fn append(&self, symbol: &str, point: PricePoint) {
        let series = self.series(symbol);
        let cutoff = point.timestamp.saturating_sub(self.retention_secs);
        {
            let _guard = series.writer.lock();
            let current = series.points.load();
            let mut next: Vec<PricePoint> = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().filter(|p| p.timestamp >= cutoff).copied());
            let at = next.partition_point(|p| p.timestamp <= point.timestamp);
            match at.checked_sub(1).and_then(|i| next.get_mut(i)) {
                Some(prev) if prev.timestamp == point.timestamp => *prev = point,
                _ => next.insert(at, point),
            }
            trace!(symbol, len = next.len(), cutoff, "history append");
            series.points.store(Arc::new(next));
        }
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record(symbol, &point, cutoff) {
                warn!(symbol, error = %e, "history sink write failed");
            }
        }
    }

    /// Replace a symbol's series with previously persisted samples, dropping
    /// anything outside the retention window ending at `now`. Of several
    /// samples at one timestamp the last one given is kept.
    pub fn restore(&self, symbol: &str, mut points: Vec<PricePoint>, now: u64) {
        let cutoff = now.saturating_sub(self.retention_secs);
        points.retain(|p| p.timestamp >= cutoff);
        points.sort_by_key(|p| p.timestamp);
        points.dedup_by(|later, kept| {
            let same = later.timestamp == kept.timestamp;
            if same {
                *kept = *later;
            }
            same
        });
        let series = self.series(symbol);
        let _guard = series.writer.lock();
        series.points.store(Arc::new(points));
    }

    /// Current snapshot of a symbol's series, oldest first.
    pub fn snapshot(&self, symbol: &str) -> Arc<Vec<PricePoint>> {
        match self.series.read().get(symbol) {
            Some(s) => s.points.load_full(),
            None => Arc::new(Vec::new()),
        }
    }

    /// Samples with `start <= timestamp <= end`.
    pub fn range(&self, symbol: &str, start: u64, end: u64) -> Vec<PricePoint> {
        self.snapshot(symbol)
            .iter()
            .filter(|p| p.timestamp >= start && p.timestamp <= end)
            .copied()
            .collect()
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.snapshot(symbol).len()
    }

    pub fn is_empty(&self, symbol: &str) -> bool {
        self.len(symbol) == 0
    }

    /// Symbols with at least one series.
    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = self.series.read().keys().cloned().collect();
        out.sort();
        out
    }
}
