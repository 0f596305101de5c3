//! Concrete end-to-end scenarios driven through the public `partest::run`
//! entry point with hand-built descriptor lists.
//!
//! Each test installs its own signal arbiter while forking, so they can't
//! run concurrently with each other in the same process; `SERIAL` keeps
//! them ordered regardless of how the outer test harness schedules threads.

use std::os::raw::c_void;
use std::sync::Mutex;
use std::time::Duration;

use partest::descriptor::TestBodyFn;
use partest::{binder, options::Options, TestDescriptor};

static SERIAL: Mutex<()> = Mutex::new(());

fn desc(name: &'static str, body: TestBodyFn) -> TestDescriptor {
    TestDescriptor {
        name,
        func_name: name,
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
    }
}

fn noop(_i: i64, _n: u64, _p: *const c_void) {}

#[test]
fn e1_two_noop_tests_both_pass() {
    let _guard = SERIAL.lock().unwrap();

    let a: &'static TestDescriptor = Box::leak(Box::new(desc("a", noop)));
    let b: &'static TestDescriptor = Box::leak(Box::new(desc("b", noop)));
    let tests: Vec<&'static TestDescriptor> = vec![a, b];

    let outcome = partest::run(&tests, &[]);
    assert_eq!(outcome.exit_code, 0);
    assert!(
        outcome.summary.contains("100%: of 2 tests run, 2 OK"),
        "summary was: {}",
        outcome.summary
    );
}

fn fails_with_boom(_i: i64, _n: u64, _p: *const c_void) {
    partest::hooks::fail("boom");
}

#[test]
fn e2_failing_test_reports_message_and_nonzero_exit() {
    let _guard = SERIAL.lock().unwrap();

    let c: &'static TestDescriptor = Box::leak(Box::new(desc("c", fails_with_boom)));
    let tests: Vec<&'static TestDescriptor> = vec![c];

    let outcome = partest::run(&tests, &[]);
    assert_eq!(outcome.exit_code, 1);
    assert!(outcome.summary.contains("FAIL"), "summary was: {}", outcome.summary);
    assert!(outcome.summary.contains("boom"), "summary was: {}", outcome.summary);
    assert!(
        outcome.summary.contains("1 tests run") && outcome.summary.contains("1 failures"),
        "summary was: {}",
        outcome.summary
    );
}

fn aborts(_i: i64, _n: u64, _p: *const c_void) {
    std::process::abort();
}

#[test]
fn e3_expected_abort_signal_passes() {
    let _guard = SERIAL.lock().unwrap();

    let mut d = desc("d", aborts);
    d.expect_signal = Some(partest::signal::name_to_number("ABRT"));
    let d: &'static TestDescriptor = Box::leak(Box::new(d));
    let tests: Vec<&'static TestDescriptor> = vec![d];

    let outcome = partest::run(&tests, &["-v".into()]);
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.summary.contains("PASS"), "summary was: {}", outcome.summary);
}

fn sleeps_past_deadline(_i: i64, _n: u64, _p: *const c_void) {
    std::thread::sleep(Duration::from_secs(2));
}

#[test]
fn e4_slow_test_times_out() {
    let _guard = SERIAL.lock().unwrap();

    let mut e = desc("e", sleeps_past_deadline);
    e.timeout_s = Some(0.01);
    let e: &'static TestDescriptor = Box::leak(Box::new(e));
    let tests: Vec<&'static TestDescriptor> = vec![e];

    let outcome = partest::run(&tests, &[]);
    assert_eq!(outcome.exit_code, 1);
    assert!(
        outcome.summary.contains("TIME OUT"),
        "summary was: {}",
        outcome.summary
    );
}

fn ranged_names_itself(i: i64, _n: u64, _p: *const c_void) {
    partest::hooks::set_iter_name(&format!("f:{}:x{}", i, i));
}

#[test]
fn e5_ranged_test_gets_per_index_names() {
    let _guard = SERIAL.lock().unwrap();

    let mut f = desc("f", ranged_names_itself);
    f.is_ranged = true;
    f.range_lo = 0;
    f.range_hi = 3;
    let f: &'static TestDescriptor = Box::leak(Box::new(f));
    let tests: Vec<&'static TestDescriptor> = vec![f];

    let outcome = partest::run(&tests, &["-v".into()]);
    assert_eq!(outcome.exit_code, 0);
    for name in ["f:0:x0", "f:1:x1", "f:2:x2"] {
        assert!(
            outcome.summary.contains(name),
            "expected {} in summary: {}",
            name,
            outcome.summary
        );
    }
}

#[test]
fn e6_filter_list_enables_and_disables_by_prefix() {
    let g_a: &'static TestDescriptor = Box::leak(Box::new(desc("g_a", noop)));
    let g_skip: &'static TestDescriptor = Box::leak(Box::new(desc("g_skip", noop)));
    let h: &'static TestDescriptor = Box::leak(Box::new(desc("h", noop)));
    let tests: Vec<&'static TestDescriptor> = vec![g_a, g_skip, h];

    let mut options = Options::default();
    options.filter = vec![
        partest::options::Filter {
            negated: false,
            prefix: "g".to_string(),
        },
        partest::options::Filter {
            negated: true,
            prefix: "g_skip".to_string(),
        },
    ];

    let bound = binder::bind(&tests, &options);
    let enabled = |name: &str| bound.iter().find(|b| b.name == name).unwrap().enabled;

    assert!(enabled("g_a"));
    assert!(!enabled("g_skip"));
    assert!(!enabled("h"));
}

