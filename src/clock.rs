//! Monotonic time.
//!
//! A thin wrapper over `std::time::Instant`. The Scheduler and Benchmarker
//! depend on `now()` never stepping backwards, which `Instant` already
//! guarantees on every platform Rust supports; the wrapper exists so the rest
//! of the crate has a single vocabulary (`Instant`/`Duration` conversions to
//! seconds and nanoseconds) instead of spreading `as f64` casts everywhere.

use std::time::{Duration, Instant};

/// A point in monotonic time.
pub type Point = Instant;

/// Returns the current monotonic time.
pub fn now() -> Point {
    Instant::now()
}

/// Seconds elapsed between two points, as used in deadlines and summaries.
pub fn to_seconds(d: Duration) -> f64 {
    d.as_secs_f64()
}

/// Nanoseconds elapsed, as used by the benchmarker's per-op timing.
pub fn to_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u128::from(u64::MAX)) as u64
}

/// Builds a `Duration` from a seconds value taken from CLI/env config.
pub fn from_seconds(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotonic() {
        let a = now();
        let b = now();
        assert!(b >= a);
    }

    #[test]
    fn seconds_roundtrip() {
        let d = from_seconds(1.5);
        assert!((to_seconds(d) - 1.5).abs() < 1e-9);
    }
}
