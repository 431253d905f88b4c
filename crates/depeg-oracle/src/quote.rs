//! Protection probability pricing.
//!
//! A coarse ladder on the absolute distance between the current index and
//! the barrier, scaled linearly against a seven-day reference horizon (capped
//! at 2x) and clamped to `[10, 1000]` bps. All arithmetic is integer ppm/bps.

use depeg_types::SECONDS_PER_DAY;
use tracing::trace;

/// Horizon the ladder values are quoted for.
pub const REFERENCE_HORIZON_SEC: u64 = 7 * SECONDS_PER_DAY;
/// Cap on horizon scaling.
pub const MAX_HORIZON_MULTIPLIER: u64 = 2;
pub const MIN_P_BPS: u64 = 10;
pub const MAX_P_BPS: u64 = 1_000;

/// `(distance denominator, bps)`: `|distance| < 1/denominator` maps to `bps`.
const LADDER: [(u64, u64); 3] = [(1_000, 500), (200, 250), (100, 150)];
const FAR_BPS: u64 = 50;

/// Ladder probability for the distance between `current_ppm` and
/// `barrier_ppm`, before horizon scaling.
pub fn base_probability_bps(current_ppm: u64, barrier_ppm: u64) -> u64 {
    let diff = u128::from(current_ppm.abs_diff(barrier_ppm));
    let barrier = u128::from(barrier_ppm);
    LADDER
        .iter()
        .find(|(denom, _)| diff * u128::from(*denom) < barrier)
        .map_or(FAR_BPS, |(_, bps)| *bps)
}

/// Scale by `min(horizon / 7d, 2)`, rounding half up.
pub fn scale_for_horizon(base_bps: u64, horizon_sec: u64) -> u64 {
    let capped = u128::from(horizon_sec.min(REFERENCE_HORIZON_SEC * MAX_HORIZON_MULTIPLIER));
    let reference = u128::from(REFERENCE_HORIZON_SEC);
    let scaled = (u128::from(base_bps) * capped + reference / 2) / reference;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Final, clamped probability in bps.
pub fn probability_bps(current_ppm: u64, barrier_ppm: u64, horizon_sec: u64) -> u64 {
    let base = base_probability_bps(current_ppm, barrier_ppm);
    let scaled = scale_for_horizon(base, horizon_sec);
    let p = scaled.clamp(MIN_P_BPS, MAX_P_BPS);
    trace!(current_ppm, barrier_ppm, horizon_sec, base, scaled, p, "probability");
    p
}

/// Signed relative distance `(current - barrier) / barrier`. Display only.
pub fn signed_distance(current_ppm: u64, barrier_ppm: u64) -> f64 {
    if barrier_ppm == 0 {
        return 0.0;
    }
    (current_ppm as f64 - barrier_ppm as f64) / barrier_ppm as f64
}
