//! Results: the aggregator.

use std::io::Write;
use std::time::{Duration, Instant};

use crate::options::Options;
use crate::result::{Disposition, TestResult};

/// Aggregated counters and the sorted vector of per-test results.
pub struct Results<'a> {
    options: &'a Options,
    out: Box<dyn Write + 'a>,
    enabled: u32,
    skipped: u32,
    passed: u32,
    errors: u32,
    failures: u32,
    finished: u32,
    total: u32,
    tests_duration: Duration,
    start: Instant,
    end: Option<Instant>,
    results: Vec<TestResult>,
}

impl<'a> Results<'a> {
    pub fn new(options: &'a Options, out: Box<dyn Write + 'a>) -> Self {
        Results {
            options,
            out,
            enabled: 0,
            skipped: 0,
            passed: 0,
            errors: 0,
            failures: 0,
            finished: 0,
            total: 0,
            tests_duration: Duration::ZERO,
            start: Instant::now(),
            end: None,
            results: Vec::new(),
        }
    }

    /// Registers one bound test before the run starts, tracking whether it
    /// counts toward `enabled`.
    pub fn inc(&mut self, enabled: bool) {
        self.total += 1;
        if enabled {
            self.enabled += 1;
        }
    }

    /// Records a finished (or disabled) result, prints its progress symbol
    /// if forking and capturing, and stamps the end time once every test is
    /// accounted for.
    pub fn record(&mut self, result: TestResult) {
        self.tests_duration += result.duration;
        match result.disposition {
            Disposition::Passed => self.passed += 1,
            Disposition::Skipped => self.skipped += 1,
            Disposition::Failed => self.failures += 1,
            Disposition::Errored => self.errors += 1,
            Disposition::TimedOut => self.failures += 1,
            Disposition::Disabled => {}
        }
        self.finished += 1;

        if self.options.fork() && self.options.capture() {
            if let Some(c) = result.disposition.progress_char() {
                let _ = write!(self.out, "{}", c);
                let _ = self.out.flush();
            }
        }

        self.results.push(result);

        if self.done() {
            self.end = Some(Instant::now());
            if self.options.fork() && self.options.capture() {
                let _ = writeln!(self.out);
            }
        }
    }

    pub fn done(&self) -> bool {
        self.finished == self.total
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed == self.enabled {
            0
        } else {
            1
        }
    }

    pub fn get(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Sorts by name and prints the headline plus every per-test line.
    pub fn dump(&mut self) {
        self.results.sort_by(|a, b| a.name.cmp(&b.name));

        let pct = if self.enabled == 0 {
            100.0
        } else {
            100.0 * self.passed as f64 / self.enabled as f64
        };
        let wall = self
            .end
            .unwrap_or_else(Instant::now)
            .duration_since(self.start)
            .as_secs_f64();
        let _ = writeln!(
            self.out,
            "{:.0}%: of {} tests run, {} OK, {} errors, {} failures, {} skipped. \
             Ran in {:.2}s (tests used {:.2}s)",
            pct,
            self.total,
            self.passed,
            self.errors,
            self.failures,
            self.skipped,
            wall,
            self.tests_duration.as_secs_f64(),
        );

        for result in &self.results {
            if result.disposition == Disposition::Disabled && self.options.verbose < 2 {
                continue;
            }
            if result.disposition == Disposition::Skipped && self.options.verbose < 2 {
                continue;
            }
            if result.disposition == Disposition::Passed && self.options.verbose < 1 {
                continue;
            }
            let _ = result.dump(&mut DisplayAdapter(&mut self.out));
        }
    }
}

/// `TestResult::dump` writes through `std::fmt::Write`; this adapts the
/// `io::Write` sink `Results` owns without an extra allocation per line.
struct DisplayAdapter<'a>(&'a mut dyn Write);

impl std::fmt::Write for DisplayAdapter<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.0.write_all(s.as_bytes()).map_err(|_| std::fmt::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, disposition: Disposition) -> TestResult {
        TestResult {
            name: name.to_string(),
            disposition,
            exit_status: Some(0),
            signal_num: None,
            duration: Duration::from_millis(1),
            stdout: String::new(),
            stderr: String::new(),
            fail_msg: None,
            last_line: None,
            bench_iters: 0,
            bench_ns_op: 0,
            is_bench: false,
        }
    }

    #[test]
    fn done_once_finished_equals_total() {
        let opts = Options::default();
        let mut buf = Vec::new();
        let mut results = Results::new(&opts, Box::new(&mut buf));
        results.inc(true);
        results.inc(true);
        assert!(!results.done());
        results.record(result("a", Disposition::Passed));
        assert!(!results.done());
        results.record(result("b", Disposition::Passed));
        assert!(results.done());
    }

    #[test]
    fn exit_code_nonzero_on_failure() {
        let opts = Options::default();
        let mut buf = Vec::new();
        let mut results = Results::new(&opts, Box::new(&mut buf));
        results.inc(true);
        results.record(result("a", Disposition::Failed));
        assert_eq!(results.exit_code(), 1);
    }

    #[test]
    fn exit_code_zero_when_all_pass() {
        let opts = Options::default();
        let mut buf = Vec::new();
        let mut results = Results::new(&opts, Box::new(&mut buf));
        results.inc(true);
        results.record(result("a", Disposition::Passed));
        assert_eq!(results.exit_code(), 0);
    }
}
