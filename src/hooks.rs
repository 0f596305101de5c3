//! Runtime hook symbols: the thin surface user-facing assertion macros call.
//! Macro authoring itself is left to downstream users; `partest` ships a
//! small convenience layer (`pt_assert!`/`pt_assert_eq!`) over these.

use crate::job::with_active;
use crate::options::Options;

/// Records `(file, line)` as the current location, distinguishing marks
/// made inside the test's own function from marks made elsewhere.
/// A no-op if called outside any running test.
pub fn mark(file: &str, func: &str, line: u32) {
    with_active(|job| {
        if let Some(job) = job {
            unsafe { (*job.env).mark(file, func, line) };
        }
    });
}

/// Formats `message` into the active test's failure buffer, flushes
/// stdout/stderr, marks the env failed, and never returns: control passes to
/// the active job's exit strategy.
pub fn fail(message: &str) -> ! {
    use std::io::Write;

    with_active(|job| match job {
        Some(job) => {
            unsafe {
                (*job.env).set_fail_msg(message);
                (*job.env).failed = true;
            }
            let _ = std::io::stdout().flush();
            let _ = std::io::stderr().flush();
            unsafe { (*job.exit_strategy).exit(255) };
        }
        None => {
            eprintln!("partest: fail() called outside any running test: {message}");
            std::process::abort();
        }
    })
}

/// Marks the active test skipped and never returns.
pub fn skip() -> ! {
    with_active(|job| match job {
        Some(job) => {
            unsafe {
                (*job.env).skipped = true;
            }
            unsafe { (*job.exit_strategy).exit(0) };
        }
        None => {
            eprintln!("partest: skip() called outside any running test");
            std::process::abort();
        }
    })
}

/// Replaces the name the parent will see for the currently-running test.
pub fn set_iter_name(name: &str) {
    with_active(|job| {
        if let Some(job) = job {
            unsafe { (*job.env).set_test_name(name) };
        }
    });
}

/// `options.port_base + slot_id + i * options.jobs` — stable per test, per
/// slot. Returns `0` outside any running test.
pub fn get_port(i: u32, options: &Options) -> u16 {
    with_active(|job| match job {
        Some(job) => {
            let slot_id = unsafe { (*job.env).slot_id };
            options
                .port_base
                .wrapping_add(slot_id as u16)
                .wrapping_add((i as u16).wrapping_mul(options.jobs as u16))
        }
        None => 0,
    })
}

/// The currently-running test's visible name.
pub fn get_name() -> String {
    with_active(|job| match job {
        Some(job) => unsafe { (*job.env).test_name() },
        None => String::new(),
    })
}

/// Convenience assertion built atop `mark`/`fail`, in the spirit of the
/// original's thin `pt()`/`pt_msg()` macros: not a full assertion framework,
/// just enough for the crate's own tests and downstream users who don't want
/// to call `fail!` directly.
#[macro_export]
macro_rules! pt_assert {
    ($cond:expr) => {
        $crate::hooks::mark(file!(), $crate::__partest_current_func!(), line!());
        if !$cond {
            $crate::hooks::fail(&format!("assertion failed: {}", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        $crate::hooks::mark(file!(), $crate::__partest_current_func!(), line!());
        if !$cond {
            $crate::hooks::fail(&format!($($arg)+));
        }
    };
}

#[macro_export]
macro_rules! pt_assert_eq {
    ($left:expr, $right:expr) => {
        $crate::hooks::mark(file!(), $crate::__partest_current_func!(), line!());
        match (&$left, &$right) {
            (l, r) => {
                if l != r {
                    $crate::hooks::fail(&format!(
                        "assertion failed: `(left == right)`\n  left: `{:?}`\n right: `{:?}`",
                        l, r
                    ));
                }
            }
        }
    };
}

/// Explicit mark with no assertion, for tests that want a location recorded
/// without checking a condition.
#[macro_export]
macro_rules! mark {
    () => {
        $crate::hooks::mark(file!(), $crate::__partest_current_func!(), line!());
    };
}

/// Best-effort "current function" name; real call-site fidelity comes from
/// the `func_name` each descriptor carries (captured via `module_path!` at
/// registration), so this only needs to be stable for direct calls from
/// within the test body itself.
#[doc(hidden)]
#[macro_export]
macro_rules! __partest_current_func {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        name.strip_suffix("::f").unwrap_or(name)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_port_outside_job_is_zero() {
        assert_eq!(get_port(0, &Options::default()), 0);
    }

    #[test]
    fn get_name_outside_job_is_empty() {
        assert_eq!(get_name(), "");
    }
}
