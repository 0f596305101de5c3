//! Test descriptor / binder, part one: the immutable descriptor shape.
//!
//! A `TestDescriptor` is produced once per `#[partest::test]`-annotated
//! function and lives for the whole process; `partest-macros` is the thing
//! that actually builds one per test and deposits a reference into
//! [`crate::TESTS`]. See [`crate::binder`] for expansion into `BoundTest`s.

use std::os::raw::c_void;

/// Signature every test body (and the generated setup/teardown wrappers)
/// must match: `(index, bench_n, item_pointer)`. `index` is the range index
/// for ranged tests (0 otherwise); `bench_n` is the inner-loop iteration
/// count handed to benchmark bodies; `item_pointer` points at the `i`-th
/// table element for table-typed tests, or is null.
pub type TestBodyFn = fn(i64, u64, *const c_void);

/// Signature for setup/teardown hooks, which ignore the benchmark iteration
/// count but still see the range index and table element.
pub type HookFn = fn(i64, u64, *const c_void);

/// Immutable description of one registered test.
#[derive(Debug)]
pub struct TestDescriptor {
    /// Programmer-visible base name.
    pub name: &'static str,
    /// Fully-qualified function symbol name, used to tell marks made inside
    /// the test body from marks made elsewhere (see [`crate::hooks::mark`]).
    pub func_name: &'static str,
    /// The test body.
    pub body: TestBodyFn,
    /// Runs inside isolation, before the body.
    pub setup: Option<HookFn>,
    /// Runs inside isolation, after the body.
    pub teardown: Option<HookFn>,
    /// Runs outside isolation, after the test (including setup/body/teardown)
    /// has fully finished — even on failure. No assertions may run here: for
    /// a forked test this runs back in the parent, after the child has
    /// already exited, so there is no isolated environment left to assert
    /// against.
    pub cleanup: Option<HookFn>,
    /// Expected process exit status, if any.
    pub expect_exit_status: Option<i32>,
    /// Expected terminating signal number, if any.
    pub expect_signal: Option<i32>,
    /// Whether an assertion failure inside this test should itself count as
    /// a pass (`PTFAIL`-equivalent).
    pub expect_fail: bool,
    /// Per-test timeout in seconds; `None` means "use `options.timeout_s`".
    pub timeout_s: Option<f64>,
    /// Whether this descriptor expands into `[range_lo, range_hi)` bound
    /// tests rather than a single one.
    pub is_ranged: bool,
    pub range_lo: i64,
    pub range_hi: i64,
    /// Optional table backing a ranged test: `(base pointer, element size)`.
    /// `partest-macros` does not currently emit table descriptors; this
    /// field exists so a hand-written descriptor can use the feature the
    /// binder already supports.
    pub table: Option<(*const c_void, usize)>,
    /// Whether this is a benchmark (skipped unless `options.bench`).
    pub is_bench: bool,
}

// TestDescriptor instances are built once at link/init time and only ever
// read afterwards; the raw pointer in `table`, if present, points at static
// or leaked data supplied by the registrant.
unsafe impl Sync for TestDescriptor {}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_body(_i: i64, _n: u64, _p: *const c_void) {}

    #[test]
    fn descriptor_defaults_are_plain() {
        let d = TestDescriptor {
            name: "x",
            func_name: "mod::x",
            body: noop_body,
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
        };
        assert_eq!(d.name, "x");
        assert!(!d.is_ranged);
    }
}
