//! A parallel, process-isolating unit-test runner for native-style Rust
//! test binaries.
//!
//! Each `#[partest::test]`-annotated function is isolated in its own forked
//! child with captured output and a wall-clock deadline; exit-status,
//! signal, and assertion expectations are enforced by the supervisor in
//! [`scheduler`]. A non-forking fallback ([`job::BasicJob`]) runs tests
//! in-process, using a non-local exit on assertion failure.
//!
//! ```ignore
//! #[partest::test]
//! fn addition_is_commutative() {
//!     assert_eq!(2 + 2, 4);
//! }
//!
//! fn main() {
//!     partest::run_main();
//! }
//! ```

pub mod bench;
pub mod binder;
#[cfg(feature = "fork")]
pub mod child;
pub mod clock;
pub mod descriptor;
pub mod error;
pub mod hooks;
pub mod job;
pub mod options;
pub mod result;
pub mod results;
#[cfg(feature = "fork")]
pub mod scheduler;
pub mod shared_cell;
pub mod signal;
pub mod test_env;

pub use descriptor::TestDescriptor;
pub use error::PartestError;
pub use options::Options;
pub use result::{Disposition, TestResult};
pub use results::Results;

use std::ffi::OsString;

/// The flat list of registered tests, populated by `#[partest::test]` via
/// `linkme::distributed_slice`. Stands in for the linker-section trick the
/// runner's own design treats as an external collaborator: the rest of this
/// crate only ever consumes this as `&[&'static TestDescriptor]`.
#[linkme::distributed_slice]
pub static TESTS: [&'static TestDescriptor] = [..];

/// The outcome of a full run, returned by [`run`] for programmatic callers
/// (the crate's own end-to-end tests, in particular) instead of exiting the
/// process directly.
pub struct RunOutcome {
    pub exit_code: i32,
    pub summary: String,
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("PARTEST_LOG"))
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_no_fork(bound: &[binder::BoundTest], options: &Options, results: &mut results::Results) {
    let mut job = job::BasicJob::new(0);
    for (i, test) in bound.iter().enumerate() {
        results.inc(test.enabled);
        let result = job.run(test, options);
        let _ = i;
        results.record(result);
    }
}

/// Gathers every registered descriptor, parses CLI/env options, binds and
/// shuffles, runs the suite, prints the summary, and exits the process with
/// [`results::Results::exit_code`].
pub fn run_main() -> ! {
    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    let tests: Vec<&'static TestDescriptor> = TESTS.iter().copied().collect();
    let outcome = run(&tests, &args);
    print!("{}", outcome.summary);
    std::process::exit(outcome.exit_code);
}

/// Runs the given descriptors against the given CLI args (`args` excludes
/// argv[0]) and returns the outcome rather than exiting the process.
/// Intended for the crate's own integration tests and any caller that wants
/// to drive the runner against a hand-picked descriptor list.
pub fn run(tests: &[&'static TestDescriptor], args: &[OsString]) -> RunOutcome {
    init_logging();

    let options = match options::parse(args) {
        Ok(options::ParseOutcome::Options(o)) => o,
        Ok(options::ParseOutcome::Usage(usage)) => {
            return RunOutcome {
                exit_code: 1,
                summary: usage,
            };
        }
        Err(e) => {
            return RunOutcome {
                exit_code: 1,
                summary: format!("{}\n", e),
            };
        }
    };

    let bound = binder::bind(tests, &options);

    let mut out = Vec::new();
    let exit_code;
    {
        let mut results = results::Results::new(&options, Box::new(&mut out));

        if options.fork() {
            #[cfg(feature = "fork")]
            {
                match scheduler::Scheduler::new(&options, &bound) {
                    Ok(scheduler) => {
                        if let Err(e) = scheduler.run(&mut results) {
                            error::fatal("scheduler", e);
                        }
                    }
                    Err(e) => error::fatal("allocating job slots", e),
                }
            }
            #[cfg(not(feature = "fork"))]
            {
                run_no_fork(&bound, &options, &mut results);
            }
        } else {
            run_no_fork(&bound, &options, &mut results);
        }

        results.dump();
        exit_code = results.exit_code();
    }

    RunOutcome {
        exit_code,
        summary: String::from_utf8_lossy(&out).into_owned(),
    }
}
