//! Sustained-breach detection.
//!
//! Scans the samples inside `[start, end]` in time order and tracks runs of
//! consecutive samples strictly below the barrier. A run's duration is the
//! distance between its first and last sample, so a lone breaching sample
//! has zero duration and can never trigger on its own.

use depeg_types::price::PricePoint;
use serde::{Deserialize, Serialize};

/// Longest breach run found in a range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOutcome {
    pub triggered: bool,
    pub event_start: u64,
    pub event_end: u64,
    pub duration: u64,
}

/// Find the longest strict-breach run in `[start_time, end_time]`.
///
/// `points` must be sorted by timestamp. No samples in range yields an
/// untriggered, all-zero outcome. Ties keep the earliest run.
pub fn evaluate_trigger(
    points: &[PricePoint],
    barrier_ppm: u64,
    window_sec: u64,
    start_time: u64,
    end_time: u64,
) -> TriggerOutcome {
    let mut best = TriggerOutcome::default();
    let mut run: Option<(u64, u64)> = None;

    for point in points
        .iter()
        .filter(|p| p.timestamp >= start_time && p.timestamp <= end_time)
    {
        if point.price_ppm() < barrier_ppm {
            run = Some(match run {
                Some((s, _)) => (s, point.timestamp),
                None => (point.timestamp, point.timestamp),
            });
        } else if let Some(open) = run.take() {
            close(open, &mut best);
        }
    }
    if let Some(open) = run {
        close(open, &mut best);
    }

    best.triggered = best.duration >= window_sec && best.duration > 0;
    best
}

fn close(run: (u64, u64), best: &mut TriggerOutcome) {
    let duration = run.1.saturating_sub(run.0);
    if duration > best.duration {
        *best = TriggerOutcome {
            triggered: false,
            event_start: run.0,
            event_end: run.1,
            duration,
        };
    }
}
