//! Result, per-test half.

use std::time::Duration;

use crate::binder::BoundTest;
use crate::options::Options;
use crate::test_env::TestEnv;

/// The outcome of one finished (or disabled) test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Passed,
    Skipped,
    Failed,
    Errored,
    TimedOut,
    Disabled,
}

impl Disposition {
    pub fn label(self) -> &'static str {
        match self {
            Disposition::Passed => "PASS",
            Disposition::Skipped => "SKIP",
            Disposition::Failed => "FAIL",
            Disposition::Errored => "ERROR",
            Disposition::TimedOut => "TIME OUT",
            Disposition::Disabled => "DISABLED",
        }
    }

    /// The `.ESFT`-style one-character progress symbol. `Passed` and
    /// `Disabled` have none printed in the main loop (a pass is silent).
    pub fn progress_char(self) -> Option<char> {
        match self {
            Disposition::Passed => Some('.'),
            Disposition::Errored => Some('E'),
            Disposition::Skipped => Some('S'),
            Disposition::Failed => Some('F'),
            Disposition::TimedOut => Some('T'),
            Disposition::Disabled => None,
        }
    }
}

/// Parent-side record of one test's outcome.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: String,
    pub disposition: Disposition,
    pub exit_status: Option<i32>,
    pub signal_num: Option<i32>,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
    pub fail_msg: Option<String>,
    pub last_line: Option<String>,
    pub bench_iters: u64,
    pub bench_ns_op: u64,
    pub is_bench: bool,
}

impl TestResult {
    pub fn disabled(bound: &BoundTest) -> TestResult {
        TestResult {
            name: bound.name.clone(),
            disposition: Disposition::Disabled,
            exit_status: None,
            signal_num: None,
            duration: Duration::ZERO,
            stdout: String::new(),
            stderr: String::new(),
            fail_msg: None,
            last_line: None,
            bench_iters: 0,
            bench_ns_op: 0,
            is_bench: bound.descriptor.is_bench,
        }
    }

    /// Marks the result as timed out ahead of `finalize`; timeout is
    /// "sticky" precisely because the scheduler calls this before
    /// `finalize` ever runs for that test.
    pub fn mark_timed_out(&mut self) {
        self.disposition = Disposition::TimedOut;
    }

    /// Computes the final disposition from the test's shared environment
    /// and descriptor expectations, applying the ordered rule list:
    /// already-`TimedOut` results are left untouched, then skipped, then
    /// failed-without-`expect_fail`, then signal mismatch, then exit-status
    /// mismatch, and only then passed.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize(
        bound: &BoundTest,
        env: &TestEnv,
        exit_status: Option<i32>,
        signal_num: Option<i32>,
        duration: Duration,
        stdout: String,
        stderr: String,
        options: &Options,
        already_timed_out: bool,
    ) -> TestResult {
        let desc = bound.descriptor;
        let name = env.test_name();
        let fail_msg = env.fail_msg();

        // Rule order follows the runner's finalize logic exactly: a plain
        // failure short-circuits before the signal/exit checks unless the
        // test expects to fail, in which case those checks still apply (a
        // test that calls `fail()` but then crashes with the wrong signal
        // is `errored`, not a pass).
        let disposition = if env.skipped {
            Disposition::Skipped
        } else if already_timed_out {
            Disposition::TimedOut
        } else if env.failed && !desc.expect_fail {
            Disposition::Failed
        } else if desc.expect_signal != signal_num {
            Disposition::Errored
        } else if desc.expect_exit_status.is_some()
            && desc.expect_exit_status != exit_status
        {
            Disposition::Errored
        } else {
            Disposition::Passed
        };

        let last_line = match disposition {
            Disposition::Passed => None,
            _ => match (env.last_mark_anywhere(), env.last_test_mark()) {
                (Some(anywhere), Some(inside)) => {
                    Some(format!("{} (last test assert: {})", anywhere, inside))
                }
                (Some(anywhere), None) => Some(anywhere),
                (None, Some(inside)) => Some(inside),
                (None, None) => None,
            },
        };

        let quiet_on_pass = disposition == Disposition::Passed && options.verbose < 3;
        let (stdout, stderr) = if quiet_on_pass {
            (String::new(), String::new())
        } else {
            (stdout, stderr)
        };

        TestResult {
            name,
            disposition,
            exit_status,
            signal_num,
            duration,
            stdout,
            stderr,
            fail_msg,
            last_line,
            bench_iters: env.bench_iters,
            bench_ns_op: env.bench_ns_op,
            is_bench: desc.is_bench,
        }
    }

    /// Renders this result the way `Results::dump` prints a per-test line.
    pub fn dump(&self, out: &mut impl std::fmt::Write) -> std::fmt::Result {
        let secs = self.duration.as_secs_f64();
        match self.disposition {
            Disposition::Passed if self.is_bench => writeln!(
                out,
                "   BENCH : {} ({} @ {} ns/op)",
                self.name, self.bench_iters, self.bench_ns_op
            ),
            Disposition::Passed => writeln!(out, "    PASS : {} ({:.6}s) ", self.name, secs),
            Disposition::Skipped => writeln!(out, "    SKIP : {}", self.name),
            Disposition::Disabled => writeln!(out, "DISABLED : {}", self.name),
            Disposition::TimedOut => {
                writeln!(out, "TIME OUT : {} ({:.6}s) : after {}", self.name, secs, self.after())
            }
            Disposition::Failed => writeln!(
                out,
                "    FAIL : {} ({:.6}s) : {} : {}",
                self.name,
                secs,
                self.fail_msg.as_deref().unwrap_or(""),
                self.after(),
            ),
            Disposition::Errored => {
                write!(out, "   ERROR : {} ({:.6}s) : after {} : ", self.name, secs, self.after())?;
                match (self.signal_num, self.exit_status) {
                    (Some(sig), _) => writeln!(out, "received signal {}", sig),
                    (None, Some(code)) => writeln!(out, "exited with status {}", code),
                    (None, None) => writeln!(out, "no exit information"),
                }
            }
        }?;
        for (label, text) in [("stdout", &self.stdout), ("stderr", &self.stderr)] {
            if !text.is_empty() {
                writeln!(out, "  --- {} ---", label)?;
                for line in text.lines() {
                    writeln!(out, "    {}", line)?;
                }
            }
        }
        Ok(())
    }

    fn after(&self) -> String {
        self.last_line.clone().unwrap_or_else(|| "<no marks>".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TestDescriptor;

    fn desc(expect_fail: bool, expect_signal: Option<i32>, expect_exit: Option<i32>) -> TestDescriptor {
        TestDescriptor {
            name: "t",
            func_name: "crate::t",
            body: |_, _, _| {},
            setup: None,
            teardown: None,
            cleanup: None,
            expect_exit_status: expect_exit,
            expect_signal: expect_signal,
            expect_fail,
            timeout_s: None,
            is_ranged: false,
            range_lo: 0,
            range_hi: 0,
            table: None,
            is_bench: false,
        }
    }

    fn bound(d: &'static TestDescriptor) -> BoundTest {
        BoundTest {
            descriptor: d,
            index: 0,
            item: std::ptr::null(),
            name: "t".to_string(),
            enabled: true,
        }
    }

    #[test]
    fn passes_when_nothing_failed() {
        let d: &'static TestDescriptor = Box::leak(Box::new(desc(false, None, None)));
        let b = bound(d);
        let mut env = TestEnv::default();
        env.reset(0, "t", "crate::t");
        let opts = Options::default();
        let r = TestResult::finalize(&b, &env, Some(0), None, Duration::ZERO, String::new(), String::new(), &opts, false);
        assert_eq!(r.disposition, Disposition::Passed);
    }

    #[test]
    fn expected_signal_passes() {
        let d: &'static TestDescriptor = Box::leak(Box::new(desc(false, Some(6), None)));
        let b = bound(d);
        let mut env = TestEnv::default();
        env.reset(0, "t", "crate::t");
        let opts = Options::default();
        let r = TestResult::finalize(&b, &env, None, Some(6), Duration::ZERO, String::new(), String::new(), &opts, false);
        assert_eq!(r.disposition, Disposition::Passed);
    }

    #[test]
    fn unexpected_signal_errors() {
        let d: &'static TestDescriptor = Box::leak(Box::new(desc(false, None, None)));
        let b = bound(d);
        let mut env = TestEnv::default();
        env.reset(0, "t", "crate::t");
        let opts = Options::default();
        let r = TestResult::finalize(&b, &env, None, Some(11), Duration::ZERO, String::new(), String::new(), &opts, false);
        assert_eq!(r.disposition, Disposition::Errored);
    }

    #[test]
    fn failed_flag_without_expect_fail_fails() {
        let d: &'static TestDescriptor = Box::leak(Box::new(desc(false, None, None)));
        let b = bound(d);
        let mut env = TestEnv::default();
        env.reset(0, "t", "crate::t");
        env.failed = true;
        env.set_fail_msg("boom");
        let opts = Options::default();
        let r = TestResult::finalize(&b, &env, Some(255), None, Duration::ZERO, String::new(), String::new(), &opts, false);
        assert_eq!(r.disposition, Disposition::Failed);
        assert_eq!(r.fail_msg.as_deref(), Some("boom"));
    }

    #[test]
    fn expect_fail_with_failed_flag_passes() {
        let d: &'static TestDescriptor = Box::leak(Box::new(desc(true, None, None)));
        let b = bound(d);
        let mut env = TestEnv::default();
        env.reset(0, "t", "crate::t");
        env.failed = true;
        let opts = Options::default();
        let r = TestResult::finalize(&b, &env, Some(255), None, Duration::ZERO, String::new(), String::new(), &opts, false);
        assert_eq!(r.disposition, Disposition::Passed);
    }

    #[test]
    fn sticky_timeout_survives_finalize() {
        let d: &'static TestDescriptor = Box::leak(Box::new(desc(false, None, None)));
        let b = bound(d);
        let mut env = TestEnv::default();
        env.reset(0, "t", "crate::t");
        let opts = Options::default();
        let r = TestResult::finalize(&b, &env, None, None, Duration::ZERO, String::new(), String::new(), &opts, true);
        assert_eq!(r.disposition, Disposition::TimedOut);
    }
}
