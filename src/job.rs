//! Job lifecycle: the per-slot driver around one running test, and the
//! exit-strategy polymorphism shared with the runtime hooks in
//! [`crate::hooks`].
//!
//! Two variants exist:
//! - [`ExitStrategy::Basic`], used in no-fork mode: `fail`/`skip` must abort
//!   the current test body from arbitrary call depth without unwinding into
//!   the scheduler. There is no `setjmp`/`longjmp` in Rust, so this uses
//!   `std::panic::catch_unwind` with a private panic payload type as the
//!   non-local jump; an ordinary test panic (e.g. a failed `assert_eq!`) is
//!   caught the same way and treated as a failure.
//! - [`ExitStrategy::Forking`], used when forking: `_exit`s the child
//!   process directly, after taking an advisory lock on the test binary
//!   (coverage instrumentation is not always fork-safe on exit).
//!
//! A run has three phases in sequence: `setup`, body, `teardown` all run
//! inside isolation (inside the `catch_unwind` boundary for `BasicJob`,
//! inside the forked child for `ForkingJob`); `cleanup` then runs outside
//! isolation, even if the test failed or timed out. For `ForkingJob` that
//! means cleanup runs back in the parent, after the child has already been
//! reaped, since there is no longer a child process to run it in.

use std::os::raw::c_void;
use std::time::{Duration, Instant};

use crate::binder::BoundTest;
use crate::descriptor::TestDescriptor;
use crate::options::Options;
use crate::result::TestResult;
use crate::test_env::TestEnv;

#[cfg(feature = "fork")]
use crate::child::Child;
#[cfg(feature = "fork")]
use crate::shared_cell::SharedCell;
#[cfg(feature = "fork")]
use nix::sys::wait::WaitStatus;

/// Payload used to unwind out of a no-fork test body back into
/// [`BasicJob::run`]; never observed by user code.
pub(crate) struct BasicExit(pub i32);

/// The per-slot policy that turns `fail`/`skip` into either a process exit
/// or a non-local jump back to the job driver.
pub enum ExitStrategy {
    Basic { thread_id: std::thread::ThreadId },
    Forking,
}

impl ExitStrategy {
    /// Never returns: either unwinds to the enclosing `catch_unwind` in
    /// `BasicJob::run`, or exits the process.
    pub fn exit(&self, status: i32) -> ! {
        match self {
            ExitStrategy::Basic { thread_id } => {
                if std::thread::current().id() != *thread_id {
                    fatal_threaded_assertion();
                }
                std::panic::resume_unwind(Box::new(BasicExit(status)));
            }
            ExitStrategy::Forking => {
                #[cfg(feature = "fork")]
                {
                    lock_binary_for_exit();
                }
                std::process::exit(status);
            }
        }
    }
}

/// Runs a test's body: the plain call for an ordinary test, or the
/// self-calibrating benchmark loop when `desc.is_bench`, writing the
/// observed iteration count and per-op cost into the shared environment.
fn run_body(
    desc: &TestDescriptor,
    env_ptr: *mut TestEnv,
    index: i64,
    item: *const c_void,
    bench_dur_s: f64,
) {
    if desc.is_bench {
        let max_ns = (bench_dur_s.max(0.0) * 1e9) as u64;
        let (iters, ns_op) = crate::bench::run_bench(desc.body, index, item, max_ns);
        unsafe {
            (*env_ptr).bench_iters = iters;
            (*env_ptr).bench_ns_op = ns_op;
        }
    } else {
        (desc.body)(index, 0, item);
    }
}

fn fatal_threaded_assertion() -> ! {
    eprintln!(
        "partest: fatal: assertion made from a thread other than the test's \
         own thread; auxiliary threads are unsupported as assertion sources \
         in no-fork mode"
    );
    std::process::abort();
}

#[cfg(feature = "fork")]
fn lock_binary_for_exit() {
    use std::fs::File;
    if let Ok(path) = std::env::current_exe() {
        if let Ok(file) = File::open(path) {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(file.as_raw_fd(), libc::LOCK_SH);
            }
            // Intentionally leak the fd/lock: the lock only needs to be
            // held until `_exit`, which is about to happen.
            std::mem::forget(file);
        }
    }
}

/// A global stack of currently-active jobs, supporting reentrancy (a
/// no-fork test launching nested no-fork machinery, as the runner's own
/// test suite does). Entries are non-owning references: the runtime hooks
/// in [`crate::hooks`] read the top of this stack to find the active
/// exit strategy and `TestEnv`.
pub(crate) struct ActiveJob {
    pub exit_strategy: *const ExitStrategy,
    pub env: *mut TestEnv,
}

thread_local! {
    pub(crate) static ACTIVE_JOBS: std::cell::RefCell<Vec<ActiveJob>> =
        std::cell::RefCell::new(Vec::new());
}

fn push_active(exit_strategy: *const ExitStrategy, env: *mut TestEnv) {
    ACTIVE_JOBS.with(|s| s.borrow_mut().push(ActiveJob { exit_strategy, env }));
}

fn pop_active() {
    ACTIVE_JOBS.with(|s| {
        s.borrow_mut().pop();
    });
}

/// Gives the runtime hooks in [`crate::hooks`] access to the top of the
/// active-job stack (the innermost currently-running test, supporting the
/// reentrant no-fork case).
pub(crate) fn with_active<R>(f: impl FnOnce(Option<&ActiveJob>) -> R) -> R {
    ACTIVE_JOBS.with(|s| f(s.borrow().last()))
}

/// Drives one test in-process (no-fork mode). Reused across tests on the
/// single worker the non-forking entrypoint uses.
pub struct BasicJob {
    slot_id: u32,
}

impl BasicJob {
    pub fn new(slot_id: u32) -> Self {
        BasicJob { slot_id }
    }

    /// Runs `bound` to completion and returns its finalized result,
    /// catching both explicit `fail()`/`skip()` unwinds and ordinary Rust
    /// panics from the test body.
    pub fn run(&mut self, bound: &BoundTest, options: &Options) -> TestResult {
        if !bound.enabled {
            return TestResult::disabled(bound);
        }

        let mut env = TestEnv::default();
        env.reset(self.slot_id, &bound.name, bound.descriptor.func_name);

        let strategy = ExitStrategy::Basic {
            thread_id: std::thread::current().id(),
        };

        let env_ptr: *mut TestEnv = &mut env;
        let strategy_ptr: *const ExitStrategy = &strategy;
        push_active(strategy_ptr, env_ptr);

        println!("Running: {}", bound.name);
        println!("{}", "=".repeat(8 + bound.name.len()));

        let desc = bound.descriptor;
        let index = bound.index;
        let item = bound.item;

        let bench_dur_s = options.bench_dur_s;
        let start = Instant::now();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            if let Some(setup) = desc.setup {
                setup(index, 0, item);
            }
            run_body(desc, env_ptr, index, item, bench_dur_s);
            if let Some(teardown) = desc.teardown {
                teardown(index, 0, item);
            }
        }));

        if let Err(payload) = outcome {
            if payload.downcast_ref::<BasicExit>().is_none() {
                // An ordinary panic (not routed through `fail`/`skip`):
                // record it as a failure with the panic message.
                let msg = panic_message(&payload);
                env.failed = true;
                env.set_fail_msg(&msg);
            }
        }

        // Cleanup runs outside isolation: past the catch_unwind boundary, so
        // it still runs whether the body passed, failed, or panicked. No
        // assertion may run here; the active-job stack still points at this
        // job's env, so one that did would just be silently wrong rather
        // than have anywhere correct to land.
        if let Some(cleanup) = desc.cleanup {
            cleanup(index, 0, item);
        }
        let duration = start.elapsed();

        pop_active();

        self.finish(bound, &env, duration, options)
    }

    fn finish(
        &self,
        bound: &BoundTest,
        env: &TestEnv,
        duration: Duration,
        options: &Options,
    ) -> TestResult {
        TestResult::finalize(
            bound,
            env,
            Some(0),
            None,
            duration,
            String::new(),
            String::new(),
            options,
            false,
        )
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test panicked".to_string()
    }
}

/// Drives one test in a forked child (forking mode), reused across tests on
/// its slot for the whole run.
#[cfg(feature = "fork")]
pub struct ForkingJob {
    slot_id: u32,
    env: SharedCell<TestEnv>,
    child: Option<Child>,
    start: Instant,
    deadline: Instant,
}

#[cfg(feature = "fork")]
impl ForkingJob {
    pub fn new(slot_id: u32) -> std::io::Result<Self> {
        Ok(ForkingJob {
            slot_id,
            env: SharedCell::new()?,
            child: None,
            start: Instant::now(),
            deadline: Instant::now(),
        })
    }

    pub fn pid(&self) -> Option<i32> {
        self.child.as_ref().map(|c| c.pid())
    }

    /// Starts `bound` running in a freshly forked child. If `bound` is
    /// disabled, returns its `Disabled` result immediately and never forks.
    pub fn run(&mut self, bound: &BoundTest, options: &Options) -> Option<TestResult> {
        if !bound.enabled {
            return Some(TestResult::disabled(bound));
        }

        unsafe {
            self.env
                .as_mut()
                .reset(self.slot_id, &bound.name, bound.descriptor.func_name);
        }

        let desc = bound.descriptor;
        let index = bound.index;
        let item = bound.item;
        let env_ptr = self.env.as_ptr();
        let bench_dur_s = options.bench_dur_s;

        let child = Child::fork(options.capture(), true, move || {
            let strategy = ExitStrategy::Forking;
            push_active(&strategy, env_ptr);
            if let Some(setup) = desc.setup {
                setup(index, 0, item);
            }
            run_body(desc, env_ptr, index, item, bench_dur_s);
            if let Some(teardown) = desc.teardown {
                teardown(index, 0, item);
            }
            // cleanup is deliberately not called here: it runs outside
            // isolation, which for a forked test means back in the parent
            // after this child has already exited.
            strategy.exit(0);
        });

        self.start = Instant::now();
        let timeout = bound.timeout_s(options);
        self.deadline = self.start + Duration::from_secs_f64(timeout.max(0.0));
        self.child = Some(child);
        None
    }

    /// Drains the child's pipes without blocking; returns `true` while it's
    /// still alive per the pipe state.
    pub fn flush_pipes(&mut self) -> bool {
        match &mut self.child {
            Some(c) => c.flush_pipes(),
            None => false,
        }
    }

    /// Called once the scheduler's `waitpid(WNOHANG)` loop reaps this slot's
    /// pid; runs cleanup now that the child is gone, then finalizes the
    /// Result from the shared env plus the child's exit status.
    pub fn cleanup_status(&mut self, bound: &BoundTest, options: &Options, status: WaitStatus) -> TestResult {
        let child = self.child.take().expect("cleanup_status with no child");
        let exit = child.reap(status);
        if let Some(cleanup) = bound.descriptor.cleanup {
            cleanup(bound.index, 0, bound.item);
        }
        let duration = self.start.elapsed();
        let env = unsafe { self.env.as_ref() };
        TestResult::finalize(
            bound,
            env,
            exit.status,
            exit.signal,
            duration,
            exit.stdout,
            exit.stderr,
            options,
            false,
        )
    }

    /// Returns `true` (and terminates the child) if this slot's deadline has
    /// passed.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        if now < self.deadline {
            return false;
        }
        self.terminate();
        true
    }

    /// Unconditionally terminates this slot's in-flight child, if any. Used
    /// by the signal arbiter's interactive-termination path, which tears the
    /// whole pool down regardless of individual deadlines.
    pub fn terminate(&mut self) {
        if let Some(child) = self.child.as_mut() {
            child.terminate();
        }
    }

    /// Builds the `timed-out` result for a slot whose deadline passed,
    /// consuming whatever output had already been captured. Cleanup still
    /// runs here, in the parent, since a timeout is a failure mode same as
    /// any other.
    pub fn timed_out_result(&mut self, bound: &BoundTest) -> TestResult {
        let child = self.child.take().expect("timed_out_result with no child");
        let exit = child.reap(WaitStatus::StillAlive);
        if let Some(cleanup) = bound.descriptor.cleanup {
            cleanup(bound.index, 0, bound.item);
        }
        let duration = self.start.elapsed();
        let mut result = TestResult {
            name: bound.name.clone(),
            disposition: crate::result::Disposition::TimedOut,
            exit_status: exit.status,
            signal_num: exit.signal,
            duration,
            stdout: exit.stdout,
            stderr: exit.stderr,
            fail_msg: None,
            last_line: None,
            bench_iters: 0,
            bench_ns_op: 0,
            is_bench: bound.descriptor.is_bench,
        };
        result.mark_timed_out();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Disposition;
    use std::os::raw::c_void;

    fn passing_body(_i: i64, _n: u64, _p: *const c_void) {}
    fn failing_body(_i: i64, _n: u64, _p: *const c_void) {
        assert_eq!(1, 2);
    }

    fn bound(body: crate::descriptor::TestBodyFn) -> BoundTest {
        let desc: &'static TestDescriptor = Box::leak(Box::new(TestDescriptor {
            name: "t",
            func_name: "crate::job::tests::t",
            body,
            setup: None,
            teardown: None,
            cleanup: None,
            expect_exit_status: None,
            expect_signal: None,
            expect_fail: false,
            timeout_s: None,
            is_ranged: false,
            range_lo: 0,
            range_hi: 0,
            table: None,
            is_bench: false,
        }));
        BoundTest {
            descriptor: desc,
            index: 0,
            item: std::ptr::null(),
            name: "t".to_string(),
            enabled: true,
        }
    }

    #[test]
    fn passing_body_yields_pass() {
        let b = bound(passing_body);
        let mut job = BasicJob::new(0);
        let r = job.run(&b, &Options::default());
        assert_eq!(r.disposition, Disposition::Passed);
    }

    #[test]
    fn panicking_body_yields_failed() {
        let b = bound(failing_body);
        let mut job = BasicJob::new(0);
        let r = job.run(&b, &Options::default());
        assert_eq!(r.disposition, Disposition::Failed);
    }

    static CLEANUP_RAN: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

    fn mark_cleanup_ran(_i: i64, _n: u64, _p: *const c_void) {
        CLEANUP_RAN.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    #[test]
    fn cleanup_runs_even_when_body_fails() {
        CLEANUP_RAN.store(false, std::sync::atomic::Ordering::SeqCst);
        let mut b = bound(failing_body);
        let desc = Box::leak(Box::new(TestDescriptor {
            cleanup: Some(mark_cleanup_ran),
            ..*b.descriptor
        }));
        b.descriptor = desc;
        let mut job = BasicJob::new(0);
        let r = job.run(&b, &Options::default());
        assert_eq!(r.disposition, Disposition::Failed);
        assert!(CLEANUP_RAN.load(std::sync::atomic::Ordering::SeqCst));
    }

    fn bench_body(_i: i64, _n: u64, _p: *const c_void) {}

    #[test]
    fn bench_descriptor_populates_iteration_count() {
        let mut b = bound(bench_body);
        let desc = Box::leak(Box::new(TestDescriptor {
            is_bench: true,
            ..*b.descriptor
        }));
        b.descriptor = desc;
        let mut options = Options::default();
        options.bench_dur_s = 0.001;
        let mut job = BasicJob::new(0);
        let r = job.run(&b, &options);
        assert_eq!(r.disposition, Disposition::Passed);
        assert!(r.is_bench);
        assert!(r.bench_iters >= 1);
    }

    #[test]
    fn disabled_test_is_recorded_without_running() {
        let mut b = bound(passing_body);
        b.enabled = false;
        let mut job = BasicJob::new(0);
        let r = job.run(&b, &Options::default());
        assert_eq!(r.disposition, Disposition::Disabled);
    }
}
