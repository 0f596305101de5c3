//! Benchmarker: the self-calibrating iteration-count loop that
//! replaces a test's body when `descriptor.is_bench` is set.

use std::os::raw::c_void;
use std::time::Instant;

use crate::descriptor::TestBodyFn;

const MAX_ITERS: u64 = 1_000_000_000;

/// Runs `body` repeatedly with a growing iteration count `n` until either
/// `MAX_ITERS` is reached or the cumulative wall-clock budget `max_ns` is
/// spent, then reports the last iteration count and the per-op nanosecond
/// cost observed on that final run.
pub fn run_bench(body: TestBodyFn, index: i64, item: *const c_void, max_ns: u64) -> (u64, u64) {
    let mut n: u64 = 1;
    let mut last_n: u64 = 1;
    let mut ns_per_op: u64 = 0;
    let mut elapsed_ns: u64 = 0;

    while n < MAX_ITERS && elapsed_ns < max_ns {
        last_n = n;
        let start = Instant::now();
        body(index, n, item);
        elapsed_ns = start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;

        ns_per_op = if n == 0 { 0 } else { elapsed_ns / n };
        n = if ns_per_op == 0 {
            MAX_ITERS
        } else {
            max_ns / ns_per_op
        };
        n = (n + n / 5).min(100 * last_n).max(last_n + 1);
        n = round_up_to_1_2_3_5_decade(n);
    }

    (last_n, ns_per_op)
}

/// Snaps `n` up to the next member of `{1,2,3,5}·10^k`. Idempotent and
/// monotone.
pub fn round_up_to_1_2_3_5_decade(n: u64) -> u64 {
    if n <= 1 {
        return 1;
    }
    let mut decade = 1u64;
    while decade * 10 <= n {
        decade *= 10;
    }
    for &step in &[1u64, 2, 3, 5, 10] {
        let candidate = decade * step;
        if candidate >= n {
            return candidate;
        }
    }
    unreachable!("10*decade always satisfies candidate >= n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decade_rounding_matches_known_values() {
        assert_eq!(round_up_to_1_2_3_5_decade(1), 1);
        assert_eq!(round_up_to_1_2_3_5_decade(2), 2);
        assert_eq!(round_up_to_1_2_3_5_decade(3), 3);
        assert_eq!(round_up_to_1_2_3_5_decade(4), 5);
        assert_eq!(round_up_to_1_2_3_5_decade(5), 5);
        assert_eq!(round_up_to_1_2_3_5_decade(6), 10);
        assert_eq!(round_up_to_1_2_3_5_decade(10), 10);
        assert_eq!(round_up_to_1_2_3_5_decade(11), 20);
        assert_eq!(round_up_to_1_2_3_5_decade(51), 100);
    }

    #[test]
    fn decade_rounding_is_idempotent() {
        for n in 1..200u64 {
            let once = round_up_to_1_2_3_5_decade(n);
            let twice = round_up_to_1_2_3_5_decade(once);
            assert_eq!(once, twice, "n={n}");
        }
    }

    #[test]
    fn decade_rounding_is_monotone() {
        let mut prev = 0;
        for n in 1..500u64 {
            let r = round_up_to_1_2_3_5_decade(n);
            assert!(r >= prev, "n={n} r={r} prev={prev}");
            prev = r;
        }
    }

    #[test]
    fn bench_loop_terminates_and_reports_n() {
        fn noop(_i: i64, _n: u64, _p: *const c_void) {}
        let (n, _ns_op) = run_bench(noop, 0, std::ptr::null(), 1_000_000);
        assert!(n >= 1);
    }
}
